//! 고정 크기 워커 풀.
//!
//! 워커들은 하나의 bounded 큐에서 요청을 꺼내 수집하고, 결과를 싱크(저장)에 넘긴 뒤
//! bounded 채널로 돌려보냅니다. 큐와 결과 채널이 모두 가득 차면 생산자가 대기합니다.
//!
//! 작업 하나의 패닉은 해당 작업의 실패 결과로 바뀌며 워커는 계속 동작합니다.
//! 풀이 종료된 뒤 결과가 없는 요청은 `TaskLost` 실패로 채워, 요청마다 정확히 하나의 결과를 보장합니다.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use ashare_core::FetchRequest;
use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use super::{
    fetcher::FailoverFetcher,
    outcome::{FailureReason, FetchOutcome, Resolution},
    progress::ProgressTracker,
};

/// 결과 수신자 (저장 등).
///
/// 성공 결과의 행을 꺼내 갈 수 있도록 가변 참조로 받습니다.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn accept(&self, outcome: &mut FetchOutcome);
}

/// 아무것도 하지 않는 싱크.
pub struct DiscardSink;

#[async_trait]
impl OutcomeSink for DiscardSink {
    async fn accept(&self, _outcome: &mut FetchOutcome) {}
}

/// 워커 풀 스케줄러.
pub struct TaskScheduler {
    fetcher: Arc<FailoverFetcher>,
    concurrency: usize,
    queue_capacity: usize,
}

impl TaskScheduler {
    pub fn new(fetcher: Arc<FailoverFetcher>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            fetcher,
            concurrency,
            queue_capacity: concurrency * 2,
        }
    }

    /// 요청 목록을 수집하고 결과를 완료 순서로 반환합니다.
    ///
    /// 반환 길이는 항상 `requests.len()`과 같습니다.
    pub async fn run_batch(
        &self,
        label: &str,
        requests: Vec<FetchRequest>,
        sink: Arc<dyn OutcomeSink>,
    ) -> Vec<FetchOutcome> {
        let total = requests.len();
        if total == 0 {
            return Vec::new();
        }
        info!(label, total, concurrency = self.concurrency, "배치 수집 시작");

        let pending = requests.clone();
        let (job_tx, job_rx) = mpsc::channel::<(usize, FetchRequest)>(self.queue_capacity);
        let (out_tx, mut out_rx) = mpsc::channel::<(usize, FetchOutcome)>(self.queue_capacity);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let feeder = tokio::spawn(async move {
            for job in requests.into_iter().enumerate() {
                if job_tx.send(job).await.is_err() {
                    break;
                }
            }
        });

        let mut workers = Vec::with_capacity(self.concurrency);
        for worker_id in 0..self.concurrency {
            let job_rx = Arc::clone(&job_rx);
            let out_tx = out_tx.clone();
            let fetcher = Arc::clone(&self.fetcher);
            let sink = Arc::clone(&sink);

            workers.push(tokio::spawn(async move {
                loop {
                    let job = { job_rx.lock().await.recv().await };
                    let Some((index, request)) = job else { break };

                    let outcome = run_task(&fetcher, sink.as_ref(), request).await;
                    if out_tx.send((index, outcome)).await.is_err() {
                        break;
                    }
                }
                debug!(worker_id, "워커 종료");
            }));
        }
        drop(out_tx);

        let mut seen = vec![false; total];
        let mut outcomes = Vec::with_capacity(total);
        let mut progress = ProgressTracker::new(label, total);

        while let Some((index, outcome)) = out_rx.recv().await {
            match seen.get_mut(index) {
                Some(flag) if !*flag => *flag = true,
                _ => {
                    warn!(index, request = %outcome.request, "중복 결과 무시");
                    continue;
                }
            }
            progress.record_completion(outcome.is_success());
            progress.log_progress(&outcome.request);
            outcomes.push(outcome);
        }

        if let Err(e) = feeder.await {
            error!(error = %e, "요청 공급 작업 비정상 종료");
        }
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "워커 비정상 종료");
            }
        }

        for (index, request) in pending.into_iter().enumerate() {
            if !seen[index] {
                warn!(request = %request, "결과 없는 요청을 실패 처리");
                outcomes.push(FetchOutcome::failed(request, FailureReason::TaskLost, Vec::new()));
            }
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(label, total, failed, "배치 수집 완료");
        outcomes
    }
}

/// 작업 1건: 수집 후 싱크 전달. 어느 단계의 패닉도 실패 결과로 바꿉니다.
async fn run_task(
    fetcher: &FailoverFetcher,
    sink: &dyn OutcomeSink,
    request: FetchRequest,
) -> FetchOutcome {
    let mut outcome = match AssertUnwindSafe(fetcher.fetch(&request)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(request = %request, panic = %message, "수집 작업 패닉");
            return FetchOutcome::failed(request, FailureReason::TaskPanicked { message }, Vec::new());
        }
    };

    if let Err(payload) = AssertUnwindSafe(sink.accept(&mut outcome)).catch_unwind().await {
        let message = panic_message(payload.as_ref());
        error!(request = %outcome.request, panic = %message, "결과 처리 패닉");
        outcome.resolution = Resolution::Failed(FailureReason::TaskPanicked { message });
        outcome.row_count = 0;
    }

    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "알 수 없는 패닉".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "알 수 없는 패닉");
    }
}
