// Core models
pub mod order;

pub use order::{
    CustomerInfo, NewOrderItem, Order, OrderItem, OrderStatus, PaymentMethod, StatusChange,
};
