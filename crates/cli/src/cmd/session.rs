//! Implementation of the `playbuild session` command.
//!
//! Serves exactly one client over stdin/stdout. Every line is one JSON
//! message; logs go to stderr so they never interleave with the protocol.
//! Closing stdin or pressing ctrl-c cancels the build in flight.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing::{info, warn};

use playbuild_lib::config::Config;
use playbuild_lib::fetch::{HttpHost, MemHost, PackageHost};
use playbuild_lib::frontend::{BundleFrontend, Frontend};
use playbuild_lib::session::{Session, SessionError, SessionSummary, serve_lines};
use playbuild_lib::vfs::{FileSystem, OsFs, Workspace};

use crate::output::{print_error, print_warning};

pub fn cmd_session(config: &Config) -> Result<()> {
  let root: Arc<dyn FileSystem> = Arc::new(OsFs::new(&config.root));
  let workspace = match &config.local_path {
    Some(local) => {
      info!(path = %local.display(), "mounting local packages");
      Workspace::with_local(root, Arc::new(OsFs::new(local)))
    }
    None => Workspace::new(root),
  };
  let frontend: Arc<dyn Frontend> = Arc::new(BundleFrontend);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let result = match &config.mirror {
    Some(mirror) => {
      let session = Session::new(workspace, frontend, HttpHost::new(mirror)).with_config(config);
      rt.block_on(serve(session))
    }
    None => {
      if config.local_path.is_none() {
        print_warning("No package mirror configured; remote imports will not resolve");
      }
      let session = Session::new(workspace, frontend, MemHost::new()).with_config(config);
      rt.block_on(serve(session))
    }
  };
  // A pending stdin read would otherwise hold the runtime open.
  rt.shutdown_background();

  match result {
    Ok(summary) => {
      info!(
        packages = summary.packages,
        sent = summary.sent,
        reused = summary.reused,
        "client synced"
      );
      Ok(())
    }
    Err(e) => {
      print_error(&format!("Session failed: {}", e));
      Err(e).context("Session failed")
    }
  }
}

async fn serve<H: PackageHost>(session: Session<H>) -> Result<SessionSummary, SessionError> {
  let cancel = session.cancel_token();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupted, cancelling session");
      cancel.cancel();
    }
  });
  serve_lines(session, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}
