pub mod machine;
pub mod payload;
pub mod session;
pub mod validate;
