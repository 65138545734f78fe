use blog_api::storage::{
    MockStorageService, S3StorageClient, StorageService, media_object_key, sanitize_key,
};

#[cfg(test)]
mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_put_then_get() {
        let mock = MockStorageService::new();
        let result = mock
            .put_object("media/a.png", vec![1, 2, 3], "image/png")
            .await;
        assert!(result.is_ok());

        let stored = mock.get_object("media/a.png").await.unwrap().unwrap();
        assert_eq!(stored.bytes, vec![1, 2, 3]);
        assert_eq!(stored.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_mock_missing_key() {
        let mock = MockStorageService::new();
        assert!(mock.get_object("media/nothing.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockStorageService::new_failing();
        assert!(mock.put_object("media/a.png", vec![1], "image/png").await.is_err());
        assert!(mock.get_object("media/a.png").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_sanitization() {
        let mock = MockStorageService::new();
        mock.put_object("../../etc/passwd", vec![0], "text/plain")
            .await
            .unwrap();

        assert_eq!(mock.keys(), vec!["etc/passwd".to_string()]);
        // Traversal on read resolves to the same sanitized key.
        assert!(mock.get_object("media/../../etc/passwd").await.unwrap().is_none());
        assert!(mock.get_object("./etc//passwd").await.unwrap().is_some());
    }
}

#[cfg(test)]
mod key_tests {
    use super::*;

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("../../etc/passwd"), "etc/passwd");
        assert_eq!(sanitize_key("/media//./x.png"), "media/x.png");
    }

    #[test]
    fn test_media_key_keeps_extension() {
        let key = media_object_key(Some("Holiday Photo.JPG"));
        assert!(key.starts_with("media/"));
        assert!(key.ends_with(".jpg"));
        // media/ + 36-char uuid + .jpg
        assert_eq!(key.len(), "media/".len() + 36 + ".jpg".len());
    }

    #[test]
    fn test_media_key_without_usable_extension() {
        let bare = media_object_key(Some("README"));
        assert_eq!(bare.len(), "media/".len() + 36);

        let missing = media_object_key(None);
        assert!(missing.starts_with("media/"));
        assert!(!missing.contains('.'));
    }

    #[test]
    fn test_media_keys_are_unique() {
        assert_ne!(media_object_key(Some("a.png")), media_object_key(Some("a.png")));
    }
}

#[cfg(test)]
mod s3_tests {
    use super::*;

    #[tokio::test]
    async fn test_s3_client_creation() {
        let _client = S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "testkey",
            "testsecret",
            "testbucket",
        )
        .await;
        // Construction performs no network I/O.
    }
}
