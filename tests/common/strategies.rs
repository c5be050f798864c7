use proptest::prelude::*;

/// Short lowercase step tags
pub fn tag_strategy() -> impl Strategy<Value = String> {
    "[a-z]{1,4}"
}

pub fn tags_strategy(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(tag_strategy(), 0..max_len)
}

pub fn payload_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{0,16}"
}
