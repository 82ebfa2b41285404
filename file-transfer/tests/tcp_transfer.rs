//! Integration tests for the plain TCP streaming mode.

use std::time::Duration;

use file_transfer::tcp;
use tokio::net::TcpListener;

#[tokio::test]
async fn tcp_download_matches_served_file() {
    let dir = tempfile::tempdir().unwrap();
    let served = dir.path().join("served.bin");
    let contents: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::write(&served, &contents).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { tcp::serve_once(&listener, &served, 1024).await });

    let dest = dir.path().join("nested").join("copy.bin");
    std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
    let received = tokio::time::timeout(
        Duration::from_secs(10),
        tcp::download_to_file(addr, &dest, 1024),
    )
    .await
    .expect("download timed out")
    .expect("download failed");

    let (_peer, sent) = server.await.unwrap().expect("serve failed");
    assert_eq!(sent, contents.len() as u64);
    assert_eq!(received, sent);
    assert_eq!(std::fs::read(&dest).unwrap(), contents);
}

#[tokio::test]
async fn tcp_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let served = dir.path().join("empty");
    std::fs::write(&served, b"").unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { tcp::serve_once(&listener, &served, 64).await });

    let mut out = Vec::new();
    let received = tcp::download(addr, &mut out, 64).await.unwrap();

    assert_eq!(received, 0);
    assert!(out.is_empty());
    assert_eq!(server.await.unwrap().unwrap().1, 0);
}
