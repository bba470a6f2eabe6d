use super::mask_secret;

#[test]
fn masks_long_secrets() {
    assert_eq!(mask_secret("sk-proj-abcdef123456"), "****3456");
}

#[test]
fn masks_short_and_empty_secrets() {
    assert_eq!(mask_secret("short"), "****");
    assert_eq!(mask_secret(""), "(not set)");
}
