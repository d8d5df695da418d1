use chat_api::normalize_chat_url;

#[test]
fn url_normalization_keeps_existing_completions_endpoint() {
    assert_eq!(
        normalize_chat_url("https://api.openai.com/v1/chat/completions"),
        "https://api.openai.com/v1/chat/completions"
    );
}

#[test]
fn url_normalization_appends_completions_to_chat_base() {
    assert_eq!(
        normalize_chat_url("http://localhost:8080/v1/chat/"),
        "http://localhost:8080/v1/chat/completions"
    );
}

#[test]
fn url_normalization_appends_chat_completions_to_generic_base() {
    assert_eq!(
        normalize_chat_url("https://api.deepseek.com"),
        "https://api.deepseek.com/chat/completions"
    );
}

#[test]
fn url_normalization_uses_default_for_blank_input() {
    assert_eq!(
        normalize_chat_url("  "),
        "https://api.openai.com/v1/chat/completions"
    );
}
