mod comments;
mod dashboard;
mod history;
mod login;
mod repairs;

pub use comments::CommentsView;
pub use dashboard::DashboardView;
pub use history::HistoryView;
pub use login::LoginView;
pub use repairs::RepairsView;

use std::sync::Arc;

use crate::backend::types::User;
use crate::backend::WorkshopClient;
use crate::config::Config;

/// What every signed-in view needs
#[derive(Clone)]
pub struct ViewContext {
  pub workshop: WorkshopClient,
  pub config: Arc<Config>,
  pub user: User,
}
