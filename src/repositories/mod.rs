//! Store contracts and their sea-orm implementations.
//!
//! Filters match by equality on every field that is set; an empty filter
//! matches everything. Services depend on the traits so tests can swap in
//! mocks.

pub mod cart_repository;
pub mod payment_record_repository;
pub mod product_repository;
pub mod transaction_repository;

pub use cart_repository::{CartFilter, CartPatch, CartRepository, DbCartRepository, NewCartItem};
pub use payment_record_repository::{
    DbPaymentRecordRepository, NewPaymentRecord, PaymentRecordFilter, PaymentRecordRepository,
};
pub use product_repository::{
    CachedProductRepository, DbProductRepository, ProductFilter, ProductRepository,
};
pub use transaction_repository::{
    DbTransactionRepository, NewTransaction, TransactionFilter, TransactionRepository,
};
