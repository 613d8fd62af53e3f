pub mod bracket;
pub mod rules;
pub mod simulate;
pub mod study;
