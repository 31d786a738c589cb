//! Proptest strategies for replicated values and list patterns

use indexmap::IndexSet;
use proptest::collection::vec;
use proptest::prelude::*;

/// Short lowercase item names without commas or whitespace
pub fn item_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.-]{0,8}"
}

pub fn item_set_strategy() -> impl Strategy<Value = IndexSet<String>> {
    vec(item_strategy(), 0..8).prop_map(|items| items.into_iter().collect())
}

pub fn item_list_strategy() -> impl Strategy<Value = Vec<String>> {
    vec(item_strategy(), 0..8)
}

/// Two item sets sharing no element
pub fn disjoint_sets_strategy() -> impl Strategy<Value = (IndexSet<String>, IndexSet<String>)> {
    (item_set_strategy(), item_set_strategy()).prop_map(|(a, b)| {
        let b = b.into_iter().filter(|item| !a.contains(item)).collect();
        (a, b)
    })
}

/// Dotted identifiers like `org.example.web`
pub fn dotted_name_strategy() -> impl Strategy<Value = String> {
    vec("[a-z]{1,6}", 1..4).prop_map(|parts| parts.join("."))
}
