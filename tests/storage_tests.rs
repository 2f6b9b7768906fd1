use estate_portal::storage::{MockStorageService, StorageService, sanitize_key};

#[tokio::test]
async fn mock_upload_returns_url_containing_key() {
    let mock = MockStorageService::new();

    let image = mock
        .upload_image("listings/house.jpg", "image/jpeg", vec![0xFF, 0xD8])
        .await
        .unwrap();

    assert_eq!(image.key, "listings/house.jpg");
    assert!(
        image
            .url
            .starts_with("http://localhost:9000/mock-bucket/"),
        "mock URLs are rooted at the mock bucket base"
    );
    assert!(image.url.contains(&image.key));
}

#[tokio::test]
async fn mock_failure_propagates_from_both_operations() {
    let mock = MockStorageService::new_failing();

    assert!(
        mock.upload_image("listings/x.jpg", "image/jpeg", vec![])
            .await
            .is_err()
    );
    assert!(mock.delete_image("listings/x.jpg").await.is_err());
}

#[tokio::test]
async fn mock_records_deleted_keys_in_order() {
    let mock = MockStorageService::new();

    mock.delete_image("listings/a.jpg").await.unwrap();
    mock.delete_image("listings/b.jpg").await.unwrap();

    let deleted = mock.deleted_keys.lock().unwrap();
    assert_eq!(*deleted, vec!["listings/a.jpg", "listings/b.jpg"]);
}

#[tokio::test]
async fn upload_key_is_sanitized_against_traversal() {
    let mock = MockStorageService::new();

    let image = mock
        .upload_image("../../etc/passwd", "text/plain", vec![])
        .await
        .unwrap();

    assert!(!image.key.contains(".."));
    assert!(!image.url.contains(".."));
}

#[test]
fn sanitize_strips_navigation_segments() {
    assert_eq!(sanitize_key("listings/photo.jpg"), "listings/photo.jpg");
    assert_eq!(sanitize_key("../secret/./file"), "secret/file");
    assert_eq!(sanitize_key("//double//slash"), "double/slash");
}
