// Checkout pipeline
pub mod checkout;
pub mod idempotency;
pub mod order_assembler;
pub mod product_validator;

// External services
pub mod product_catalog;
