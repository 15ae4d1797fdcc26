mod build;
mod info;
mod publish;
mod session;

pub use build::cmd_build;
pub use info::cmd_info;
pub use publish::{PublishTarget, cmd_publish};
pub use session::cmd_session;
