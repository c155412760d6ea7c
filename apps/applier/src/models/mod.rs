pub mod application;
pub mod listing;

pub use application::ApplicationRecord;
pub use listing::Listing;
