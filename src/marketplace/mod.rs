pub mod chat;
pub mod client;
pub mod products;
pub mod quotation;

pub use chat::ChatMessage;
pub use client::{MarketplaceClient, MarketplaceError};
pub use products::{ProductDetail, ProductSummary, SupplierDetail, Variant};
pub use quotation::NonQuotableError;
