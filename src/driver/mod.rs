//! Batched request driver.
//!
//! Replays a test [`Script`] against a running bank server. Each block's
//! cases are split into batches of `threads` requests; every request of a
//! batch runs concurrently and the next batch starts only once the whole
//! batch has finished. That barrier is the only ordering guarantee, so
//! scripts whose expectations depend on order must use a batch size of 1.
//!
//! Individual failures (connect errors, bad framing, wrong bodies) are
//! reported and counted; they never stop the run.

pub mod script;

use crate::config::DriverConfig;
use crate::error::{DriverError, ProtocolError};
use crate::protocol::{encode_request, read_response, HttpResponse};
pub use script::{Block, RunDirective, Script, TestCase};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// A request that did not produce its expected response
#[derive(Debug)]
pub struct Failure {
    pub request: String,
    pub error: DriverError,
}

/// Outcome of a script run
#[derive(Debug, Default)]
pub struct RunReport {
    pub sent: usize,
    pub passed: usize,
    pub failures: Vec<Failure>,
    /// Cases after the last run directive
    pub skipped: usize,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Count one finished batch. `outcomes[i]` belongs to `cases[i]`; a
    /// missing outcome means the request task never completed.
    fn record(&mut self, cases: &[TestCase], outcomes: Vec<Option<Result<(), DriverError>>>) {
        for (case, outcome) in cases.iter().zip(outcomes) {
            self.sent += 1;
            match outcome.unwrap_or(Err(DriverError::TaskFailed)) {
                Ok(()) => self.passed += 1,
                Err(e) => {
                    warn!(request = %case.request, error = %e, "Request failed");
                    self.failures.push(Failure {
                        request: case.request.clone(),
                        error: e,
                    });
                }
            }
        }
    }
}

pub struct Driver {
    config: DriverConfig,
}

impl Driver {
    pub fn new(config: DriverConfig) -> Self {
        Driver { config }
    }

    /// Run every block of the script, printing progress for the operator.
    pub async fn run_script(&self, script: &Script) -> RunReport {
        let mut report = RunReport::default();

        for (index, block) in script.blocks.iter().enumerate() {
            debug!(
                block = index,
                cases = block.cases.len(),
                threads = block.run.threads,
                repetitions = block.run.repetitions,
                "Running block"
            );
            for _ in 0..block.run.repetitions {
                self.run_batches(&block.cases, block.run.threads, &mut report)
                    .await;
            }
            println!("Finished block #{index} testing phase.");
        }

        if !script.unrun.is_empty() {
            warn!(
                count = script.unrun.len(),
                "Test cases after the last run directive were not executed"
            );
            report.skipped = script.unrun.len();
        }

        println!("Testing completed.");
        info!(
            sent = report.sent,
            passed = report.passed,
            failed = report.failed(),
            "Run finished"
        );
        report
    }

    /// Send `cases` in consecutive batches of `threads` concurrent requests.
    pub async fn run_batches(&self, cases: &[TestCase], threads: usize, report: &mut RunReport) {
        for batch in cases.chunks(threads.max(1)) {
            let mut tasks = JoinSet::new();
            for (index, case) in batch.iter().enumerate() {
                let case = case.clone();
                let config = self.config.clone();
                tasks.spawn(async move { (index, check_case(&config, &case).await) });
            }

            let mut outcomes: Vec<Option<Result<(), DriverError>>> =
                batch.iter().map(|_| None).collect();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, result)) => outcomes[index] = Some(result),
                    Err(e) => error!(error = %e, "Request task failed"),
                }
            }
            report.record(batch, outcomes);
        }
    }
}

async fn check_case(config: &DriverConfig, case: &TestCase) -> Result<(), DriverError> {
    let response = send_request(config, &case.request).await?;

    if !response.is_ok() {
        return Err(DriverError::UnexpectedStatus(response.status_line()));
    }
    if response.body != case.expected {
        return Err(DriverError::Mismatch {
            expected: case.expected.clone(),
            actual: response.body,
        });
    }
    Ok(())
}

/// Open a connection, send one request for `target` and read the response.
pub async fn send_request(
    config: &DriverConfig,
    target: &str,
) -> Result<HttpResponse, DriverError> {
    let addr = config.addr();

    let exchange = async {
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| DriverError::Connect {
                addr: addr.clone(),
                source,
            })?;

        stream
            .write_all(&encode_request(target, &addr))
            .await
            .map_err(ProtocolError::from)?;

        let mut reader = BufReader::new(stream);
        let response = read_response(&mut reader).await?;
        Ok::<_, DriverError>(response)
    };

    tokio::time::timeout(config.timeout, exchange)
        .await
        .map_err(|_| DriverError::Timeout(config.timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[test]
    fn test_report_counts() {
        let mut report = RunReport::default();
        assert!(report.is_success());

        report.sent = 2;
        report.passed = 1;
        report.failures.push(Failure {
            request: "transaction=reset".to_string(),
            error: DriverError::Timeout(Duration::from_secs(1)),
        });

        assert_eq!(report.failed(), 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_record_counts_lost_task_as_failure() {
        let cases: Vec<TestCase> = ["transaction=reset", "transaction=status&account=1"]
            .into_iter()
            .map(|request| TestCase {
                request: request.to_string(),
                expected: "All accounts reset".to_string(),
            })
            .collect();

        let mut report = RunReport::default();
        report.record(&cases, vec![Some(Ok(())), None]);

        assert_eq!(report.sent, 2);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.sent, report.passed + report.failed());
        assert!(!report.is_success());
        assert_eq!(report.failures[0].request, "transaction=status&account=1");
        assert!(matches!(report.failures[0].error, DriverError::TaskFailed));
    }

    #[tokio::test]
    async fn test_send_request_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = DriverConfig::new("127.0.0.1", port);
        let result = send_request(&config, "transaction=reset").await;
        assert!(matches!(result, Err(DriverError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_check_case_reports_mismatch_and_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let replies: [&[u8]; 2] = [
                b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nHello",
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n",
            ];
            for reply in replies {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = [0u8; 1024];
                let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await;
                stream.write_all(reply).await.unwrap();
            }
        });

        let config = DriverConfig::new("127.0.0.1", port);
        let case = TestCase {
            request: "transaction=status&account=1".to_string(),
            expected: "Account 1: $0.00".to_string(),
        };

        match check_case(&config, &case).await {
            Err(DriverError::Mismatch { expected, actual }) => {
                assert_eq!(expected, "Account 1: $0.00");
                assert_eq!(actual, "Hello");
            }
            other => panic!("unexpected: {:?}", other),
        }

        match check_case(&config, &case).await {
            Err(DriverError::UnexpectedStatus(line)) => {
                assert_eq!(line, "HTTP/1.1 404 Not Found");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
