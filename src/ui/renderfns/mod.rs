pub mod footer;
pub mod header;
pub mod notice;
pub mod utils;

pub use footer::draw_footer;
pub use header::{draw_header, HeaderInfo};
pub use notice::draw_notice;
pub use utils::{status_color, truncate};
