pub mod checkout;
pub mod error;
pub mod fulfillment;
pub mod reporting;

pub use checkout::{CartLine, CheckoutPhase, CheckoutRequest};
pub use error::{FulfillmentError, FulfillmentResult};
pub use fulfillment::{FulfillmentPolicy, FulfillmentService};
pub use reporting::ReportingService;
