use std::net::SocketAddr;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cafe::downloader::{DownloadError, Downloader, FileDownloader};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use warp::Filter;

fn serve_installers() -> SocketAddr {
  let installer = warp::path!("chef" / "18.2.7" / "chef_18.2.7.deb").map(|| "installer bytes");
  let (addr, serving) = warp::serve(installer).bind_ephemeral(([127, 0, 0, 1], 0));
  tokio::spawn(serving);
  addr
}

#[tokio::test]
async fn test_downloads_into_a_new_directory() {
  let addr = serve_installers();
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("staging").join("chef_18.2.7.deb");

  FileDownloader::new()
    .download(&format!("http://{}/chef/18.2.7/chef_18.2.7.deb", addr), &file)
    .await
    .unwrap();

  assert_eq!(std::fs::read_to_string(&file).unwrap(), "installer bytes");
  assert!(!dir.path().join("staging").join("chef_18.2.7.deb.part").exists());
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
  let addr = serve_installers();
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("chef_1.0.0.deb");
  let url = format!("http://{}/chef/1.0.0/chef_1.0.0.deb", addr);

  let err = FileDownloader::new().download(&url, &file).await.unwrap_err();

  assert!(matches!(&err, DownloadError::NotFound(missing) if *missing == url), "{:?}", err);
  assert!(!file.exists());
}

/// Promises 1000 bytes, sends a few and hangs up. Counts connections.
async fn serve_truncated() -> (SocketAddr, Arc<AtomicUsize>) {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  let connections = Arc::new(AtomicUsize::new(0));
  let counter = connections.clone();
  tokio::spawn(async move {
    while let Ok((mut socket, _)) = listener.accept().await {
      counter.fetch_add(1, Ordering::SeqCst);
      let mut request = [0u8; 1024];
      let _ = socket.read(&mut request).await;
      let _ = socket
        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\npartial")
        .await;
      let _ = socket.shutdown().await;
    }
  });
  (addr, connections)
}

#[tokio::test]
async fn test_truncated_download_leaves_nothing_staged() {
  let (addr, connections) = serve_truncated().await;
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("chef_18.2.7.deb");

  let result = FileDownloader::new()
    .with_max_retries(2)
    .download(&format!("http://{}/chef/18.2.7/chef_18.2.7.deb", addr), &file)
    .await;

  assert!(result.is_err(), "{:?}", result);
  assert!(!matches!(result, Err(DownloadError::NotFound(_))));
  assert!(!file.exists());
  assert!(!dir.path().join("chef_18.2.7.deb.part").exists());
  assert!(connections.load(Ordering::SeqCst) >= 3);
}
