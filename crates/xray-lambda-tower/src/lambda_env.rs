//! Lambda execution environment detection.
//!
//! The middleware must be a no-op outside the Lambda runtime (local
//! development, CI), so tracing is gated on the same probe the managed
//! runtime guarantees: `LAMBDA_TASK_ROOT` is set for every function
//! invocation environment.

/// Environment variable set by the Lambda runtime to the function's code root.
const LAMBDA_TASK_ROOT: &str = "LAMBDA_TASK_ROOT";

/// Returns `true` when running inside the AWS Lambda execution environment.
///
/// The variable is read on every call rather than cached: test harnesses
/// and local emulators toggle it per scenario.
pub fn check_in_lambda() -> bool {
    std::env::var(LAMBDA_TASK_ROOT)
        .map(|value| !value.is_empty())
        .unwrap_or(false)
}
