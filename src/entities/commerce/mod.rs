pub mod cart;
pub mod payment_record;
pub mod product;
pub mod transaction;

pub use cart::{CartStatus, Entity as Cart, Model as CartModel, MAX_LINE_QUANTITY};
pub use payment_record::{
    Entity as PaymentRecord, Model as PaymentRecordModel, PaymentData, PaymentStatus,
};
pub use product::{Entity as Product, Model as ProductModel};
pub use transaction::{Entity as Transaction, Model as TransactionModel};
