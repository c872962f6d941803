//! Line-oriented operator console
//!
//! Stands in for the device's HTTP routes. One request per line,
//! `<route> [body]`, one response line per request:
//!
//! | Request                        | Response                       |
//! |--------------------------------|--------------------------------|
//! | `getConfig`                    | `200 {"maxRuntime":..}`        |
//! | `setConfig {json}`             | `200 OK`                       |
//! | `getHistoricalData`            | `200 [[daysAgo,..],..]` (60 d) |
//! | `getLogs <days>`               | `200 [[daysAgo,..],..]`        |
//! | `setFault {"fault":true}`      | `200 OK`                       |
//! | `setDateTime {json}`           | `200 OK`                       |
//! | `reset`                        | restarts; no response          |
//!
//! Malformed requests answer `400 Bad Request: <reason>`, unknown routes
//! `404 Not Found`, and store or clock failures
//! `500 Internal Server Error: <reason>`.

use std::fmt;
use std::io::{self, BufRead, Write};

use embassy_futures::block_on;
use embedded_hal::digital::OutputPin;
use log::warn;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

use wellbeing_core::storage::StorageMedium;
use wellbeing_core::{
    ConfigRequest, DateTimeRequest, MonitorError, PumpMonitor, RealTimeClock, SystemReset,
};

/// Days covered by `getHistoricalData`
pub const HISTORICAL_DAYS: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(Option<String>),
    BadRequest(String),
    NotFound,
    Failed(String),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(None) => f.write_str("200 OK"),
            Self::Ok(Some(body)) => write!(f, "200 {}", body),
            Self::BadRequest(reason) => write!(f, "400 Bad Request: {}", reason),
            Self::NotFound => f.write_str("404 Not Found"),
            Self::Failed(reason) => write!(f, "500 Internal Server Error: {}", reason),
        }
    }
}

#[derive(Deserialize)]
struct FaultRequest {
    fault: bool,
}

fn parse<T: DeserializeOwned>(body: &str) -> Result<T, Response> {
    serde_json::from_str(body).map_err(|e| Response::BadRequest(e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> Result<Response, Response> {
    serde_json::to_string(value)
        .map(|body| Response::Ok(Some(body)))
        .map_err(|e| Response::Failed(e.to_string()))
}

fn failure(err: MonitorError) -> Response {
    match err {
        MonitorError::Request(reason) => Response::BadRequest(reason.to_string()),
        other => {
            warn!(" Request failed: {}", other);
            Response::Failed(other.to_string())
        }
    }
}

/// Answer one request line.
pub async fn handle<M, C, R, L, S>(monitor: &PumpMonitor<M, C, R, L, S>, line: &str) -> Response
where
    M: StorageMedium,
    C: RealTimeClock,
    R: OutputPin,
    L: OutputPin,
    S: SystemReset,
{
    let line = line.trim();
    let (route, body) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(route, body)| (route, body.trim()));

    dispatch(monitor, route, body)
        .await
        .unwrap_or_else(|response| response)
}

async fn dispatch<M, C, R, L, S>(
    monitor: &PumpMonitor<M, C, R, L, S>,
    route: &str,
    body: &str,
) -> Result<Response, Response>
where
    M: StorageMedium,
    C: RealTimeClock,
    R: OutputPin,
    L: OutputPin,
    S: SystemReset,
{
    match route {
        "getConfig" => to_json(&monitor.config().await),
        "setConfig" => {
            let request: ConfigRequest = parse(body)?;
            monitor.set_config(&request).await.map_err(failure)?;
            Ok(Response::Ok(None))
        }
        "getHistoricalData" => to_json(&monitor.logs(HISTORICAL_DAYS).await.map_err(failure)?),
        "getLogs" => {
            let days: u32 = body
                .parse()
                .map_err(|e| Response::BadRequest(format!("days: {}", e)))?;
            to_json(&monitor.logs(days).await.map_err(failure)?)
        }
        "setFault" => {
            let request: FaultRequest = parse(body)?;
            monitor.set_fault(request.fault).await;
            Ok(Response::Ok(None))
        }
        "setDateTime" => {
            let request: DateTimeRequest = parse(body)?;
            monitor.set_date_time(&request).await.map_err(failure)?;
            Ok(Response::Ok(None))
        }
        "reset" => {
            let restarted = monitor.reset().await.map_err(failure)?;
            match restarted {}
        }
        _ => Err(Response::NotFound),
    }
}

/// Answer requests from `input` until it closes.
pub fn serve<M, C, R, L, S, I, O>(
    monitor: &PumpMonitor<M, C, R, L, S>,
    input: I,
    mut output: O,
) -> io::Result<()>
where
    M: StorageMedium,
    C: RealTimeClock,
    R: OutputPin,
    L: OutputPin,
    S: SystemReset,
    I: BufRead,
    O: Write,
{
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = block_on(handle(monitor, &line));
        writeln!(output, "{}", response)?;
        output.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::path::Path;

    use crate::file_medium::FileMedium;
    use crate::hardware::{HostClock, LoggedPin};
    use wellbeing_core::hardware::{LAMP_PIN, RELAY_PIN};

    struct UnwindReset;

    impl SystemReset for UnwindReset {
        fn hard_reset(&mut self) -> ! {
            panic!("restart requested");
        }
    }

    type TestMonitor = PumpMonitor<FileMedium, HostClock, LoggedPin, LoggedPin, UnwindReset>;

    fn boot(path: &Path) -> TestMonitor {
        block_on(PumpMonitor::boot(
            FileMedium::new(path),
            HostClock::new(),
            LoggedPin::new("relay", RELAY_PIN),
            LoggedPin::new("lamp", LAMP_PIN),
            UnwindReset,
        ))
        .unwrap()
    }

    fn request(monitor: &TestMonitor, line: &str) -> String {
        block_on(handle(monitor, line)).to_string()
    }

    #[test]
    fn test_get_config_reports_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = boot(&dir.path().join("database.bin"));

        let response = request(&monitor, "getConfig");

        assert!(
            response.starts_with(
                r#"200 {"maxRuntime":480,"maxCycles":360,"minCurrent":0.25,"bootTime":["#
            ),
            "{response}"
        );
    }

    #[test]
    fn test_set_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = boot(&dir.path().join("database.bin"));

        let response = request(
            &monitor,
            r#"setConfig {"maxCycles":2,"maxRuntime":600,"minCurrent":0.25}"#,
        );
        assert_eq!(response, "200 OK");

        let response = request(&monitor, "getConfig");
        assert!(
            response.starts_with(r#"200 {"maxRuntime":600,"maxCycles":2,"minCurrent":0.25"#),
            "{response}"
        );
    }

    #[test]
    fn test_malformed_requests_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = boot(&dir.path().join("database.bin"));

        assert_eq!(
            request(&monitor, r#"setConfig {"maxCycles":2,"minCurrent":0.25}"#),
            "400 Bad Request: missing field `maxRuntime`"
        );
        assert!(request(&monitor, "setConfig {not json").starts_with("400 Bad Request"));
        assert!(request(&monitor, "setConfig").starts_with("400 Bad Request"));
        assert!(request(&monitor, "getLogs soon").starts_with("400 Bad Request: days"));
        assert!(request(&monitor, r#"setFault {"fault":"yes"}"#).starts_with("400 Bad Request"));
        assert!(
            request(&monitor, r#"setDateTime {"year":2024,"month":2,"monthDay":30,"hour":0,"minute":0,"second":0,"weekday":1}"#)
                .starts_with("400 Bad Request")
        );

        assert!(request(&monitor, "getConfig").contains(r#""maxCycles":360"#));
    }

    #[test]
    fn test_unknown_route() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = boot(&dir.path().join("database.bin"));

        assert_eq!(request(&monitor, "getWeather"), "404 Not Found");
    }

    #[test]
    fn test_logs_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = boot(&dir.path().join("database.bin"));

        assert_eq!(request(&monitor, "getLogs 15"), "200 []");
        assert_eq!(request(&monitor, "getHistoricalData"), "200 []");
    }

    #[test]
    fn test_set_fault() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = boot(&dir.path().join("database.bin"));

        assert_eq!(request(&monitor, r#"setFault {"fault":true}"#), "200 OK");
        assert!(block_on(monitor.fault()));

        assert_eq!(request(&monitor, r#"setFault {"fault":false}"#), "200 OK");
        assert!(!block_on(monitor.fault()));
    }

    #[test]
    fn test_reset_removes_store_and_reboots_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.bin");
        let monitor = boot(&path);
        request(
            &monitor,
            r#"setConfig {"maxCycles":2,"maxRuntime":600,"minCurrent":0.25}"#,
        );
        assert!(path.exists());

        let outcome = catch_unwind(AssertUnwindSafe(|| request(&monitor, "reset")));

        assert!(outcome.is_err());
        assert!(!path.exists());

        let rebooted = boot(&path);
        assert!(
            request(&rebooted, "getConfig")
                .starts_with(r#"200 {"maxRuntime":480,"maxCycles":360,"minCurrent":0.25"#)
        );
    }

    #[test]
    fn test_serve_answers_each_line() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = boot(&dir.path().join("database.bin"));
        let input = Cursor::new("setFault {\"fault\":true}\n\nnope\ngetLogs 1\n");
        let mut output = Vec::new();

        serve(&monitor, input, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines, ["200 OK", "404 Not Found", "200 []"]);
    }
}
