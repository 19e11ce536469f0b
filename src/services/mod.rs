// Pure pricing
pub mod delivery_fee;

// Checkout
pub mod inventory;
pub mod orders;

// Payments
pub mod payment_gateway;
pub mod payment_sweeper;
pub mod payments;
