// Money arithmetic shared by checkout, settlement and reporting
pub mod pricing;

// Cart, checkout and settlement
pub mod commerce;

// Order ledger
pub mod orders;

// Earnings and reporting
pub mod commission;
pub mod reports;

// Influencer payouts
pub mod withdrawals;
