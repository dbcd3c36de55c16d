pub mod qr_traits;
pub mod repository_traits;

pub use qr_traits::QrEncoder;
pub use repository_traits::{PointsLedger, TokenRegistry};
