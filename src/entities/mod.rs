pub mod address;
pub mod cart;
pub mod cart_item;
pub mod coin_transaction;
pub mod order;
pub mod order_item;
pub mod order_status;
pub mod product;
pub mod seller;
pub mod voucher;

// Re-export entities
pub use address::{Entity as Address, Model as AddressModel};
pub use cart::{Entity as Cart, Model as CartModel, PaymentMethod};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use coin_transaction::{Entity as CoinTransaction, Model as CoinTransactionModel};
pub use order::{Entity as Order, Model as OrderModel};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use order_status::{Entity as OrderStatus, Model as OrderStatusModel, StatusCode};
pub use product::{Entity as Product, Model as ProductModel};
pub use seller::{Entity as Seller, Model as SellerModel};
pub use voucher::{Entity as Voucher, Model as VoucherModel, VoucherKind, VoucherValueType};
