// libs/shared/utils/src/lib.rs
pub mod test_utils;
