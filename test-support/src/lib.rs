pub mod fake_resend;
pub mod fake_turnstile;

// Nothing listens on port 1 locally, so connections are refused immediately.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:1/unreachable";

pub fn setup_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
