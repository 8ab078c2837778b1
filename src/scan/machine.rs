// 扫描状态机 - 纯状态转换，不做任何 I/O
//
// 会话收到输入后返回需要执行的副作用（发起分析、安排重试、提交记录、推送事件），
// 由会话 Actor 负责执行。每开始一轮新的分析，generation 加一，
// 带着旧 generation 返回的结果和重试定时都会被丢弃。

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::presenter;
use super::retry::{RetryDecision, RetryPolicy};
use crate::analysis::{AnalysisOutcome, AnalysisResult};
use crate::api::{FoodLogEntry, LoggedFood, MealType};
use crate::capture::{ImageHandle, UploadPayload};
use crate::error::ScanError;
use crate::event_bus::ScanEvent;

/// 扫描状态（识别结果只存在于 Succeeded 中）
#[derive(Clone, Debug, PartialEq)]
pub enum ScanState {
    Idle,
    Uploading,
    /// 等待重试定时
    Retrying,
    NotFood { message: Option<String> },
    Failed { reason: String },
    Succeeded { result: AnalysisResult },
}

/// 不带数据的状态标签
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStateKind {
    Idle,
    Uploading,
    Retrying,
    NotFood,
    Failed,
    Succeeded,
}

impl ScanState {
    pub fn kind(&self) -> ScanStateKind {
        match self {
            Self::Idle => ScanStateKind::Idle,
            Self::Uploading => ScanStateKind::Uploading,
            Self::Retrying => ScanStateKind::Retrying,
            Self::NotFood { .. } => ScanStateKind::NotFood,
            Self::Failed { .. } => ScanStateKind::Failed,
            Self::Succeeded { .. } => ScanStateKind::Succeeded,
        }
    }

    /// 是否有分析请求或重试定时在进行
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Uploading | Self::Retrying)
    }
}

/// 状态机输入
#[derive(Clone, Debug)]
pub enum ScanInput {
    /// 拍照或选图成功且编码完成
    ImageReady {
        image: ImageHandle,
        payload: UploadPayload,
    },
    /// 拍照或选图成功但图片无法编码
    ImageRejected { image: ImageHandle, reason: String },
    AnalysisFinished {
        generation: u64,
        outcome: AnalysisOutcome,
    },
    RetryDue { generation: u64 },
    /// 不是食物时选择重拍
    Retake,
    /// 手动重试（分析失败后），或对已成功的图片重新分析
    TryAgain,
    Cancel,
    CommitRequested {
        meal_type: MealType,
        now: DateTime<Utc>,
    },
    CommitFinished {
        generation: u64,
        outcome: Result<LoggedFood, ScanError>,
    },
}

/// 需要会话 Actor 执行的副作用
#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Analyze {
        generation: u64,
        attempt: u8,
        payload: UploadPayload,
    },
    ScheduleRetry { generation: u64, delay: Duration },
    /// 中止进行中的分析请求或重试定时
    CancelPending,
    /// 重拍：立即再次打开相机
    RequestCapture,
    SubmitLog { generation: u64, entry: FoodLogEntry },
    Emit(ScanEvent),
}

/// 会话快照（供界面渲染）
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScanSnapshot {
    pub session_id: Uuid,
    pub generation: u64,
    pub state: ScanStateKind,
    pub attempt: u8,
    pub image: Option<PathBuf>,
    pub result: Option<AnalysisResult>,
    pub committing: bool,
    pub last_error: Option<String>,
    pub status: String,
}

/// 扫描会话（一次拍照到提交或放弃的完整交互）
#[derive(Clone, Debug)]
pub struct ScanSession {
    id: Uuid,
    generation: u64,
    image: Option<ImageHandle>,
    payload: Option<UploadPayload>,
    attempt: u8,
    state: ScanState,
    committing: bool,
    last_error: Option<String>,
    policy: RetryPolicy,
}

impl ScanSession {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation: 0,
            image: None,
            payload: None,
            attempt: 0,
            state: ScanState::Idle,
            committing: false,
            last_error: None,
            policy,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn attempt(&self) -> u8 {
        self.attempt
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn image(&self) -> Option<&ImageHandle> {
        self.image.as_ref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        match &self.state {
            ScanState::Succeeded { result } => Some(result),
            _ => None,
        }
    }

    pub fn is_committing(&self) -> bool {
        self.committing
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        let kind = self.state.kind();
        ScanSnapshot {
            session_id: self.id,
            generation: self.generation,
            state: kind,
            attempt: self.attempt,
            image: self.image.as_ref().map(|i| i.path().to_path_buf()),
            result: self.result().cloned(),
            committing: self.committing,
            last_error: self.last_error.clone(),
            status: presenter::status_line(
                kind,
                self.attempt,
                self.policy.max_auto_retries(),
                self.result(),
            ),
        }
    }

    /// 处理一个输入，返回需要执行的副作用
    pub fn apply(&mut self, input: ScanInput) -> Result<Vec<Effect>, ScanError> {
        match input {
            ScanInput::ImageReady { image, payload } => self.on_image_ready(image, payload),
            ScanInput::ImageRejected { image, reason } => self.on_image_rejected(image, reason),
            ScanInput::AnalysisFinished {
                generation,
                outcome,
            } => Ok(self.on_analysis_finished(generation, outcome)),
            ScanInput::RetryDue { generation } => self.on_retry_due(generation),
            ScanInput::Retake => self.on_retake(),
            ScanInput::TryAgain => self.on_try_again(),
            ScanInput::Cancel => self.on_cancel(),
            ScanInput::CommitRequested { meal_type, now } => self.on_commit_requested(meal_type, now),
            ScanInput::CommitFinished {
                generation,
                outcome,
            } => Ok(self.on_commit_finished(generation, outcome)),
        }
    }

    fn ensure_not_committing(&self) -> Result<(), ScanError> {
        if self.committing {
            return Err(ScanError::Busy("饮食记录正在提交"));
        }
        Ok(())
    }

    /// 清空图片和结果，回到空闲状态，返回之前是否有进行中的请求
    fn reset(&mut self) -> bool {
        let was_in_flight = self.state.is_in_flight();
        self.generation += 1;
        self.image = None;
        self.payload = None;
        self.attempt = 0;
        self.state = ScanState::Idle;
        was_in_flight
    }

    fn start_analysis(&mut self, effects: &mut Vec<Effect>) -> Result<(), ScanError> {
        let payload = self
            .payload
            .clone()
            .ok_or(ScanError::InvalidTransition("没有可上传的图片"))?;

        self.state = ScanState::Uploading;
        effects.push(Effect::Analyze {
            generation: self.generation,
            attempt: self.attempt,
            payload,
        });
        effects.push(Effect::Emit(ScanEvent::AnalysisStarted {
            session_id: self.id,
            generation: self.generation,
            attempt: self.attempt,
        }));
        Ok(())
    }

    fn on_image_ready(
        &mut self,
        image: ImageHandle,
        payload: UploadPayload,
    ) -> Result<Vec<Effect>, ScanError> {
        self.ensure_not_committing()?;

        let mut effects = Vec::new();
        if self.reset() {
            info!("新图片替换了进行中的分析，旧结果将被丢弃");
            effects.push(Effect::CancelPending);
        }
        self.image = Some(image);
        self.payload = Some(payload);
        self.last_error = None;

        self.start_analysis(&mut effects)?;
        Ok(effects)
    }

    fn on_image_rejected(
        &mut self,
        image: ImageHandle,
        reason: String,
    ) -> Result<Vec<Effect>, ScanError> {
        self.ensure_not_committing()?;

        warn!("图片无法使用: {:?}: {}", image.path(), reason);
        let mut effects = Vec::new();
        if self.reset() {
            effects.push(Effect::CancelPending);
        }
        self.last_error = Some(reason.clone());
        effects.push(Effect::Emit(ScanEvent::ImageRejected {
            session_id: self.id,
            reason,
        }));
        Ok(effects)
    }

    fn on_analysis_finished(&mut self, generation: u64, outcome: AnalysisOutcome) -> Vec<Effect> {
        if generation != self.generation || self.state != ScanState::Uploading {
            debug!(
                "丢弃过期的分析结果 (generation {} / 当前 {})",
                generation, self.generation
            );
            return Vec::new();
        }

        match outcome {
            AnalysisOutcome::Recognized(result) => {
                info!("图片分析成功: {:.0} kcal", result.total_calories);
                self.attempt = 0;
                self.last_error = None;
                self.state = ScanState::Succeeded {
                    result: result.clone(),
                };
                vec![Effect::Emit(ScanEvent::AnalysisSucceeded {
                    session_id: self.id,
                    result,
                })]
            }
            AnalysisOutcome::NotFood { message } => {
                info!("服务端判定图片不是食物");
                self.state = ScanState::NotFood {
                    message: message.clone(),
                };
                vec![Effect::Emit(ScanEvent::NotFoodDetected {
                    session_id: self.id,
                    message,
                })]
            }
            AnalysisOutcome::TransientFailure { reason } => {
                self.last_error = Some(reason.clone());
                match self.policy.decide(self.attempt) {
                    RetryDecision::Retry { attempt, delay } => {
                        warn!(
                            "图片分析失败 (重试 {}/{}): {}，等待 {}ms 后重试...",
                            attempt,
                            self.policy.max_auto_retries(),
                            reason,
                            delay.as_millis()
                        );
                        self.attempt = attempt;
                        self.state = ScanState::Retrying;
                        vec![
                            Effect::ScheduleRetry {
                                generation: self.generation,
                                delay,
                            },
                            Effect::Emit(ScanEvent::RetryScheduled {
                                session_id: self.id,
                                attempt,
                                delay,
                                reason,
                            }),
                        ]
                    }
                    RetryDecision::GiveUp => {
                        warn!("图片分析失败，已达到最大重试次数: {}", reason);
                        self.state = ScanState::Failed {
                            reason: reason.clone(),
                        };
                        vec![Effect::Emit(ScanEvent::AnalysisFailed {
                            session_id: self.id,
                            reason,
                        })]
                    }
                }
            }
        }
    }

    fn on_retry_due(&mut self, generation: u64) -> Result<Vec<Effect>, ScanError> {
        if generation != self.generation || self.state != ScanState::Retrying {
            debug!("丢弃过期的重试定时 (generation {})", generation);
            return Ok(Vec::new());
        }

        let mut effects = Vec::new();
        self.start_analysis(&mut effects)?;
        Ok(effects)
    }

    fn on_retake(&mut self) -> Result<Vec<Effect>, ScanError> {
        if !matches!(self.state, ScanState::NotFood { .. }) {
            return Err(ScanError::InvalidTransition("只有识别为非食物时才能重拍"));
        }

        self.reset();
        self.last_error = None;
        Ok(vec![
            Effect::Emit(ScanEvent::SessionReset {
                session_id: self.id,
            }),
            Effect::RequestCapture,
        ])
    }

    fn on_try_again(&mut self) -> Result<Vec<Effect>, ScanError> {
        self.ensure_not_committing()?;
        if !matches!(
            self.state,
            ScanState::Failed { .. } | ScanState::Succeeded { .. }
        ) {
            return Err(ScanError::InvalidTransition("当前没有可重新分析的图片"));
        }

        info!("手动重新分析，重试计数归零");
        self.generation += 1;
        self.attempt = 0;
        self.last_error = None;

        let mut effects = Vec::new();
        self.start_analysis(&mut effects)?;
        Ok(effects)
    }

    fn on_cancel(&mut self) -> Result<Vec<Effect>, ScanError> {
        self.ensure_not_committing()?;

        let mut effects = Vec::new();
        if self.reset() {
            effects.push(Effect::CancelPending);
        }
        self.last_error = None;
        effects.push(Effect::Emit(ScanEvent::SessionReset {
            session_id: self.id,
        }));
        Ok(effects)
    }

    fn on_commit_requested(
        &mut self,
        meal_type: MealType,
        now: DateTime<Utc>,
    ) -> Result<Vec<Effect>, ScanError> {
        self.ensure_not_committing()?;
        let entry = match &self.state {
            ScanState::Succeeded { result } => presenter::build_entry(result, meal_type, now),
            _ => return Err(ScanError::InvalidTransition("没有可提交的识别结果")),
        };

        self.committing = true;
        Ok(vec![Effect::SubmitLog {
            generation: self.generation,
            entry,
        }])
    }

    fn on_commit_finished(
        &mut self,
        generation: u64,
        outcome: Result<LoggedFood, ScanError>,
    ) -> Vec<Effect> {
        if !self.committing || generation != self.generation {
            debug!("丢弃过期的提交结果 (generation {})", generation);
            return Vec::new();
        }
        self.committing = false;

        match outcome {
            Ok(logged) => {
                self.reset();
                self.last_error = None;
                vec![
                    Effect::Emit(ScanEvent::LogCommitted {
                        session_id: self.id,
                        logged,
                    }),
                    Effect::Emit(ScanEvent::SessionReset {
                        session_id: self.id,
                    }),
                ]
            }
            Err(e) => {
                // 识别结果保留，用户可以再次提交
                let reason = e.to_string();
                self.last_error = Some(reason.clone());
                vec![Effect::Emit(ScanEvent::CommitFailed {
                    session_id: self.id,
                    reason,
                })]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> UploadPayload {
        UploadPayload::new("photo.jpg", "image/jpeg", vec![0xFF, 0xD8, 0xFF])
    }

    fn pizza() -> AnalysisResult {
        AnalysisResult {
            total_calories: 450.0,
            total_protein: 12.0,
            total_carbs: 50.0,
            total_fats: 18.0,
            labels: vec!["pizza".to_string()],
            breakdown: vec![],
        }
    }

    fn session_uploading() -> (ScanSession, u64) {
        let mut session = ScanSession::new(RetryPolicy::default());
        let effects = session
            .apply(ScanInput::ImageReady {
                image: ImageHandle::new("/tmp/pizza.jpg"),
                payload: payload(),
            })
            .unwrap();
        let generation = session.generation();
        assert!(effects.contains(&Effect::Analyze {
            generation,
            attempt: 0,
            payload: payload(),
        }));
        (session, generation)
    }

    fn transient(session: &mut ScanSession, generation: u64) -> Vec<Effect> {
        session
            .apply(ScanInput::AnalysisFinished {
                generation,
                outcome: AnalysisOutcome::transient("timeout"),
            })
            .unwrap()
    }

    fn analyze_count(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::Analyze { .. }))
            .count()
    }

    #[test]
    fn test_new_session_is_idle() {
        let session = ScanSession::new(RetryPolicy::default());
        assert_eq!(session.state(), &ScanState::Idle);
        assert_eq!(session.attempt(), 0);
        assert!(session.result().is_none());
        assert!(session.image().is_none());
    }

    #[test]
    fn test_success_sets_result_and_resets_attempt() {
        let (mut session, generation) = session_uploading();
        transient(&mut session, generation);
        session.apply(ScanInput::RetryDue { generation }).unwrap();
        assert_eq!(session.attempt(), 1);

        let effects = session
            .apply(ScanInput::AnalysisFinished {
                generation,
                outcome: AnalysisOutcome::Recognized(pizza()),
            })
            .unwrap();

        assert_eq!(session.state().kind(), ScanStateKind::Succeeded);
        assert_eq!(session.attempt(), 0);
        assert_eq!(session.result(), Some(&pizza()));
        assert!(matches!(
            effects.as_slice(),
            [Effect::Emit(ScanEvent::AnalysisSucceeded { .. })]
        ));
    }

    #[test]
    fn test_transient_failure_schedules_one_retry_with_fixed_delay() {
        let (mut session, generation) = session_uploading();

        let effects = transient(&mut session, generation);
        assert_eq!(session.state(), &ScanState::Retrying);
        assert_eq!(session.attempt(), 1);
        assert_eq!(analyze_count(&effects), 0, "等待期间不应发起请求");
        assert!(effects.contains(&Effect::ScheduleRetry {
            generation,
            delay: Duration::from_secs(1),
        }));

        let effects = session.apply(ScanInput::RetryDue { generation }).unwrap();
        assert_eq!(session.state(), &ScanState::Uploading);
        assert_eq!(
            effects[0],
            Effect::Analyze {
                generation,
                attempt: 1,
                payload: payload(),
            },
            "重试必须复用同一份上传内容"
        );
    }

    #[test]
    fn test_three_transient_failures_end_in_failed() {
        let (mut session, generation) = session_uploading();
        let mut analyze_calls = 1;

        for _ in 0..2 {
            transient(&mut session, generation);
            let effects = session.apply(ScanInput::RetryDue { generation }).unwrap();
            analyze_calls += analyze_count(&effects);
        }
        assert_eq!(session.attempt(), 2);

        let effects = transient(&mut session, generation);
        assert_eq!(analyze_calls, 3);
        assert_eq!(session.state().kind(), ScanStateKind::Failed);
        assert_eq!(session.attempt(), 2, "attempt 不超过 2");
        assert!(!effects
            .iter()
            .any(|e| matches!(e, Effect::ScheduleRetry { .. } | Effect::Analyze { .. })));

        // 失败后再来的定时不会触发第 4 次请求
        let effects = session.apply(ScanInput::RetryDue { generation }).unwrap();
        assert!(effects.is_empty());
    }

    #[test]
    fn test_not_food_never_retries() {
        for failures_before in 0..=2 {
            let (mut session, generation) = session_uploading();
            for _ in 0..failures_before {
                transient(&mut session, generation);
                session.apply(ScanInput::RetryDue { generation }).unwrap();
            }

            let effects = session
                .apply(ScanInput::AnalysisFinished {
                    generation,
                    outcome: AnalysisOutcome::NotFood { message: None },
                })
                .unwrap();

            assert_eq!(session.state().kind(), ScanStateKind::NotFood);
            assert!(!effects
                .iter()
                .any(|e| matches!(e, Effect::ScheduleRetry { .. } | Effect::Analyze { .. })));
        }
    }

    #[test]
    fn test_retake_after_not_food() {
        let (mut session, generation) = session_uploading();
        session
            .apply(ScanInput::AnalysisFinished {
                generation,
                outcome: AnalysisOutcome::NotFood { message: None },
            })
            .unwrap();

        let effects = session.apply(ScanInput::Retake).unwrap();
        assert_eq!(session.state(), &ScanState::Idle);
        assert!(session.image().is_none());
        assert!(effects.contains(&Effect::RequestCapture));

        let effects = session
            .apply(ScanInput::ImageReady {
                image: ImageHandle::new("/tmp/second.jpg"),
                payload: payload(),
            })
            .unwrap();
        assert_eq!(session.attempt(), 0);
        assert_eq!(analyze_count(&effects), 1);
    }

    #[test]
    fn test_retake_only_from_not_food() {
        let (mut session, _) = session_uploading();
        assert!(matches!(
            session.apply(ScanInput::Retake),
            Err(ScanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_cancel_clears_image_and_result() {
        let (mut session, generation) = session_uploading();
        session
            .apply(ScanInput::AnalysisFinished {
                generation,
                outcome: AnalysisOutcome::Recognized(pizza()),
            })
            .unwrap();

        session.apply(ScanInput::Cancel).unwrap();
        assert_eq!(session.state(), &ScanState::Idle);
        assert!(session.result().is_none());
        assert!(session.image().is_none());
    }

    #[test]
    fn test_cancel_from_not_food() {
        let (mut session, generation) = session_uploading();
        session
            .apply(ScanInput::AnalysisFinished {
                generation,
                outcome: AnalysisOutcome::NotFood { message: None },
            })
            .unwrap();

        let effects = session.apply(ScanInput::Cancel).unwrap();
        assert_eq!(session.state(), &ScanState::Idle);
        assert!(session.image().is_none());
        assert!(!effects.contains(&Effect::CancelPending));
        assert!(!effects.contains(&Effect::RequestCapture));
        assert!(effects.contains(&Effect::Emit(ScanEvent::SessionReset {
            session_id: session.id(),
        })));
    }

    #[test]
    fn test_cancel_from_failed() {
        let (mut session, generation) = session_uploading();
        for _ in 0..2 {
            transient(&mut session, generation);
            session.apply(ScanInput::RetryDue { generation }).unwrap();
        }
        transient(&mut session, generation);
        assert_eq!(session.state().kind(), ScanStateKind::Failed);

        session.apply(ScanInput::Cancel).unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, ScanStateKind::Idle);
        assert_eq!(snapshot.attempt, 0);
        assert!(snapshot.image.is_none());
        assert!(snapshot.last_error.is_none());
        assert!(matches!(
            session.apply(ScanInput::TryAgain),
            Err(ScanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_cancel_while_uploading_drops_late_result() {
        let (mut session, generation) = session_uploading();

        let effects = session.apply(ScanInput::Cancel).unwrap();
        assert!(effects.contains(&Effect::CancelPending));

        let effects = session
            .apply(ScanInput::AnalysisFinished {
                generation,
                outcome: AnalysisOutcome::Recognized(pizza()),
            })
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(session.state(), &ScanState::Idle);
        assert!(session.result().is_none());
    }

    #[test]
    fn test_cancel_while_retrying_drops_old_timer() {
        let (mut session, generation) = session_uploading();
        transient(&mut session, generation);
        assert_eq!(session.state(), &ScanState::Retrying);

        let effects = session.apply(ScanInput::Cancel).unwrap();
        assert!(effects.contains(&Effect::CancelPending));

        let effects = session.apply(ScanInput::RetryDue { generation }).unwrap();
        assert_eq!(analyze_count(&effects), 0);
        assert!(effects.is_empty());
        assert_eq!(session.state(), &ScanState::Idle);
        assert_eq!(session.attempt(), 0);
    }

    #[test]
    fn test_manual_try_again_resets_attempt_budget() {
        let (mut session, generation) = session_uploading();
        for _ in 0..2 {
            transient(&mut session, generation);
            session.apply(ScanInput::RetryDue { generation }).unwrap();
        }
        transient(&mut session, generation);
        assert_eq!(session.state().kind(), ScanStateKind::Failed);

        let effects = session.apply(ScanInput::TryAgain).unwrap();
        let new_generation = session.generation();
        assert!(new_generation > generation);
        assert_eq!(session.attempt(), 0);
        assert_eq!(
            effects[0],
            Effect::Analyze {
                generation: new_generation,
                attempt: 0,
                payload: payload(),
            }
        );

        // 重新获得完整的自动重试次数
        transient(&mut session, new_generation);
        assert_eq!(session.state(), &ScanState::Retrying);
    }

    #[test]
    fn test_new_image_discards_in_flight_result() {
        let (mut session, old_generation) = session_uploading();

        let effects = session
            .apply(ScanInput::ImageReady {
                image: ImageHandle::new("/tmp/salad.jpg"),
                payload: payload(),
            })
            .unwrap();
        assert_eq!(effects[0], Effect::CancelPending);
        let new_generation = session.generation();

        // 旧请求的成功结果迟到，不应生效
        let effects = session
            .apply(ScanInput::AnalysisFinished {
                generation: old_generation,
                outcome: AnalysisOutcome::Recognized(pizza()),
            })
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(session.state(), &ScanState::Uploading);

        // 旧请求的失败结果同样被丢弃
        assert!(transient(&mut session, old_generation).is_empty());
        assert_eq!(session.attempt(), 0);

        let mut salad = pizza();
        salad.labels = vec!["salad".to_string()];
        session
            .apply(ScanInput::AnalysisFinished {
                generation: new_generation,
                outcome: AnalysisOutcome::Recognized(salad.clone()),
            })
            .unwrap();
        assert_eq!(session.result(), Some(&salad));
    }

    #[test]
    fn test_new_image_during_retry_wait_ignores_old_timer() {
        let (mut session, old_generation) = session_uploading();
        transient(&mut session, old_generation);

        session
            .apply(ScanInput::ImageReady {
                image: ImageHandle::new("/tmp/salad.jpg"),
                payload: payload(),
            })
            .unwrap();

        let effects = session
            .apply(ScanInput::RetryDue {
                generation: old_generation,
            })
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(session.attempt(), 0);
    }

    #[test]
    fn test_image_rejected_returns_to_idle() {
        let (mut session, _) = session_uploading();
        let effects = session
            .apply(ScanInput::ImageRejected {
                image: ImageHandle::new("/tmp/broken.jpg"),
                reason: "图片文件为空".to_string(),
            })
            .unwrap();

        assert_eq!(session.state(), &ScanState::Idle);
        assert_eq!(effects[0], Effect::CancelPending);
        assert_eq!(session.snapshot().last_error.as_deref(), Some("图片文件为空"));
    }

    #[test]
    fn test_commit_scenario() {
        let (mut session, generation) = session_uploading();
        session
            .apply(ScanInput::AnalysisFinished {
                generation,
                outcome: AnalysisOutcome::Recognized(AnalysisResult {
                    total_calories: 450.0,
                    total_protein: 0.0,
                    total_carbs: 0.0,
                    total_fats: 0.0,
                    labels: vec!["pizza".to_string()],
                    breakdown: vec![],
                }),
            })
            .unwrap();

        let now = Utc::now();
        let effects = session
            .apply(ScanInput::CommitRequested {
                meal_type: MealType::default(),
                now,
            })
            .unwrap();

        let entry = match &effects[..] {
            [Effect::SubmitLog { entry, .. }] => entry.clone(),
            other => panic!("未得到预期副作用: {:?}", other),
        };
        assert_eq!(entry.food_name, "pizza");
        assert_eq!(entry.calories, 450.0);
        assert_eq!(entry.serving_size, 100.0);
        assert_eq!(entry.servings_consumed, 1.0);
        assert_eq!(entry.meal_type, MealType::Snack);
        assert!(session.is_committing());

        // 提交期间不能重复提交，也不能开始新的扫描
        assert!(matches!(
            session.apply(ScanInput::CommitRequested {
                meal_type: MealType::Snack,
                now
            }),
            Err(ScanError::Busy(_))
        ));
        assert!(matches!(
            session.apply(ScanInput::ImageReady {
                image: ImageHandle::new("/tmp/x.jpg"),
                payload: payload(),
            }),
            Err(ScanError::Busy(_))
        ));
    }

    #[test]
    fn test_commit_failure_keeps_result() {
        let (mut session, generation) = session_uploading();
        session
            .apply(ScanInput::AnalysisFinished {
                generation,
                outcome: AnalysisOutcome::Recognized(pizza()),
            })
            .unwrap();
        session
            .apply(ScanInput::CommitRequested {
                meal_type: MealType::Dinner,
                now: Utc::now(),
            })
            .unwrap();

        let effects = session
            .apply(ScanInput::CommitFinished {
                generation,
                outcome: Err(ScanError::CommitFailed("HTTP 500".to_string())),
            })
            .unwrap();

        assert!(!session.is_committing());
        assert_eq!(session.result(), Some(&pizza()));
        assert!(!effects.iter().any(|e| matches!(e, Effect::SubmitLog { .. })), "不自动重新提交");

        // 用户可以手动再次提交
        let effects = session
            .apply(ScanInput::CommitRequested {
                meal_type: MealType::Dinner,
                now: Utc::now(),
            })
            .unwrap();
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn test_commit_success_ends_session_cycle() {
        let (mut session, generation) = session_uploading();
        session
            .apply(ScanInput::AnalysisFinished {
                generation,
                outcome: AnalysisOutcome::Recognized(pizza()),
            })
            .unwrap();
        session
            .apply(ScanInput::CommitRequested {
                meal_type: MealType::Snack,
                now: Utc::now(),
            })
            .unwrap();

        let logged = LoggedFood {
            id: Some(1),
            food_name: "pizza".to_string(),
            calories: 450.0,
            meal_type: Some("snack".to_string()),
            consumed_at: None,
        };
        session
            .apply(ScanInput::CommitFinished {
                generation,
                outcome: Ok(logged),
            })
            .unwrap();

        assert_eq!(session.state(), &ScanState::Idle);
        assert!(session.result().is_none());
        assert!(session.image().is_none());
    }

    #[test]
    fn test_commit_requires_result() {
        let (mut session, _) = session_uploading();
        assert!(matches!(
            session.apply(ScanInput::CommitRequested {
                meal_type: MealType::Snack,
                now: Utc::now(),
            }),
            Err(ScanError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_result_present_iff_succeeded() {
        let (mut session, generation) = session_uploading();
        assert!(session.snapshot().result.is_none());
        transient(&mut session, generation);
        assert!(session.snapshot().result.is_none());

        session.apply(ScanInput::RetryDue { generation }).unwrap();
        session
            .apply(ScanInput::AnalysisFinished {
                generation,
                outcome: AnalysisOutcome::Recognized(pizza()),
            })
            .unwrap();
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, ScanStateKind::Succeeded);
        assert!(snapshot.result.is_some());
        assert_eq!(snapshot.status, "450 kcal");
    }
}
