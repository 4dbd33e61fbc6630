use crate::routes::router;
use rankflow_core::application::{CallbackReconciler, ShutdownToken};
use std::io;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Serve the callback API on `listener` until shutdown
pub async fn serve(
    listener: TcpListener,
    reconciler: Arc<CallbackReconciler>,
    mut shutdown: ShutdownToken,
) -> io::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Callback server listening");

    axum::serve(listener, router(reconciler))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    info!("Callback server stopped");
    Ok(())
}
