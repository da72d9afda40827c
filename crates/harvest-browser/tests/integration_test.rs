use harvest_browser::{BrowserDriver, ChromeSession, FingerprintConfig};
use harvest_core::BrowserConfig;

fn headless() -> BrowserConfig {
    BrowserConfig {
        headless: true,
        ..BrowserConfig::default()
    }
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_session_launch() {
    let session = ChromeSession::launch(&headless(), &FingerprintConfig::randomized()).await;
    assert!(session.is_ok(), "Failed to launch browser session");
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_execute_script_and_errors() {
    let session = ChromeSession::launch(&headless(), &FingerprintConfig::randomized())
        .await
        .unwrap();

    let value = session.execute_script("return 1 + 2;").await.unwrap();
    assert_eq!(value, serde_json::json!(3));

    let err = session
        .execute_script("throw new Error('Malformed UTF-8 data');")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Malformed UTF-8 data"));
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_tabs() {
    let session = ChromeSession::launch(&headless(), &FingerprintConfig::randomized())
        .await
        .unwrap();

    let main = session.current_window().await.unwrap();
    let second = session.open_window("about:blank").await.unwrap();
    assert_eq!(session.window_handles().await.unwrap().len(), 2);
    assert_eq!(session.current_window().await.unwrap(), second);

    session.switch_to(&main).await.unwrap();
    session.close_window(&second).await.unwrap();
    assert_eq!(session.window_handles().await.unwrap(), vec![main]);
}
