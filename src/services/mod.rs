pub mod cart;
pub mod checkout;
pub mod coin_ledger;
pub mod notifications;
pub mod orders;
pub mod payment;
pub mod pricing;
pub mod shipping;
pub mod vouchers;

pub use cart::CartService;
pub use checkout::CheckoutService;
pub use orders::OrderService;
pub use shipping::ShippingGateway;
pub use vouchers::VoucherService;
