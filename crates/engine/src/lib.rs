pub mod fit;
pub mod layout;
pub mod pager;

pub use fit::{fit, PagingInfo, CANNOT_DISPLAY, MESSAGE_MAX_LEN, NO_RESULTS};
pub use layout::{layout, LayoutPlan};
pub use pager::{bypass_text, Pager, PagerControl, PagerUpdate};
