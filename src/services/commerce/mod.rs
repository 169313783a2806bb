/// Commerce services module - catalog, cart, checkout and payment settlement
pub mod cart_service;
pub mod catalog;
pub mod checkout_service;
pub mod payment_confirmation;

// Re-export services for convenience
pub use cart_service::{AddToCartInput, AdjustAction, CartService, CartView};
pub use catalog::{CatalogService, CreateProductInput};
pub use checkout_service::{CheckoutMode, CheckoutService, CheckoutSession};
pub use payment_confirmation::{
    ConfirmPaymentInput, ConfirmationOutcome, PaymentConfirmationService,
};
