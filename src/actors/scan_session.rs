// Scan Session Actor - 使用Actor模式驱动扫描会话
//
// 所有命令串行处理，状态机只在Actor内部修改，不需要锁。
// 相机/图库交互、分析请求、重试等待和提交都在后台任务中执行，
// 完成后通过内部通道回到Actor，Actor 循环本身从不等待用户操作。

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::analysis::{AnalysisOutcome, FoodAnalyzer};
use crate::api::{FoodLogSink, LoggedFood, MealType};
use crate::capture::{
    CaptureOutcome, ImageHandle, ImageSource, PickOutcome, UploadEncoder, UploadPayload,
};
use crate::error::ScanError;
use crate::event_bus::EventBus;
use crate::scan::{Effect, RetryPolicy, ScanInput, ScanSession, ScanSnapshot, Sleeper};

/// 拍照/选图命令的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SourceReply {
    /// 已开始分析
    Started(ScanSnapshot),
    /// 用户取消，会话保持不变
    Cancelled(ScanSnapshot),
}

/// 扫描会话命令
pub enum ScanCommand {
    /// 拍照并分析
    Capture {
        reply: oneshot::Sender<Result<SourceReply, ScanError>>,
    },

    /// 从图库选图并分析
    Pick {
        reply: oneshot::Sender<Result<SourceReply, ScanError>>,
    },

    /// 不是食物时重拍
    Retake {
        reply: oneshot::Sender<Result<SourceReply, ScanError>>,
    },

    /// 手动重试
    TryAgain {
        reply: oneshot::Sender<Result<ScanSnapshot, ScanError>>,
    },

    /// 取消，回到空闲状态
    Cancel {
        reply: oneshot::Sender<Result<ScanSnapshot, ScanError>>,
    },

    /// 提交饮食记录，提交完成后回复
    Commit {
        meal_type: Option<MealType>,
        reply: oneshot::Sender<Result<LoggedFood, ScanError>>,
    },

    /// 获取会话快照
    Snapshot { reply: oneshot::Sender<ScanSnapshot> },

    /// 健康检查（Ping）
    HealthCheck { reply: oneshot::Sender<()> },
}

/// 拍照/选图并编码后的结果
enum Acquired {
    Ready {
        image: ImageHandle,
        payload: UploadPayload,
    },
    Rejected {
        image: ImageHandle,
        reason: String,
    },
    Cancelled,
}

/// 后台任务完成通知
enum Completion {
    /// 相机或图库交互结束，回复在状态机处理后发送
    Acquired {
        result: Result<Acquired, ScanError>,
        reply: oneshot::Sender<Result<SourceReply, ScanError>>,
    },
    Analysis {
        generation: u64,
        outcome: AnalysisOutcome,
    },
    RetryDue {
        generation: u64,
    },
    Commit {
        generation: u64,
        outcome: Result<LoggedFood, ScanError>,
    },
}

/// 会话依赖的外部协作者
#[derive(Clone)]
pub struct ScanDependencies {
    pub source: ImageSource,
    pub analyzer: Arc<dyn FoodAnalyzer>,
    pub log_sink: Arc<dyn FoodLogSink>,
    pub sleeper: Arc<dyn Sleeper>,
    pub events: Arc<EventBus>,
    pub default_meal_type: MealType,
}

/// Scan Session Actor（每个扫描界面一个）
pub struct ScanSessionActor {
    receiver: mpsc::Receiver<ScanCommand>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    session: ScanSession,
    deps: ScanDependencies,
    /// 进行中的分析请求或重试等待
    pending: Option<JoinHandle<()>>,
    /// 相机或图库界面是否打开中
    acquiring: bool,
    commit_reply: Option<oneshot::Sender<Result<LoggedFood, ScanError>>>,
}

impl ScanSessionActor {
    /// 创建新的Actor
    pub fn new(deps: ScanDependencies, policy: RetryPolicy) -> (Self, ScanHandle) {
        let (sender, receiver) = mpsc::channel(32);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let actor = Self {
            receiver,
            completion_tx,
            completion_rx,
            session: ScanSession::new(policy),
            deps,
            pending: None,
            acquiring: false,
            commit_reply: None,
        };
        (actor, ScanHandle { sender })
    }

    /// 运行Actor（在单独的任务中运行），所有 Handle 释放后退出
    pub async fn run(mut self) {
        info!("扫描会话 Actor 已启动: {}", self.session.id());

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(done) = self.completion_rx.recv() => self.handle_completion(done),
            }
        }

        self.abort_pending();
        info!("扫描会话 Actor 已停止: {}", self.session.id());
    }

    fn handle_command(&mut self, cmd: ScanCommand) {
        match cmd {
            ScanCommand::Capture { reply } => self.start_acquire(true, reply),

            ScanCommand::Pick { reply } => self.start_acquire(false, reply),

            ScanCommand::Retake { reply } => {
                if self.acquiring {
                    let _ = reply.send(Err(ScanError::Busy("相机或图库已打开")));
                    return;
                }
                match self.apply(ScanInput::Retake) {
                    Ok(true) => self.start_acquire(true, reply),
                    Ok(false) => {
                        let _ = reply.send(Ok(SourceReply::Cancelled(self.session.snapshot())));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            ScanCommand::TryAgain { reply } => {
                let result = self
                    .apply(ScanInput::TryAgain)
                    .map(|_| self.session.snapshot());
                let _ = reply.send(result);
            }

            ScanCommand::Cancel { reply } => {
                let result = self
                    .apply(ScanInput::Cancel)
                    .map(|_| self.session.snapshot());
                let _ = reply.send(result);
            }

            ScanCommand::Commit { meal_type, reply } => {
                let input = ScanInput::CommitRequested {
                    meal_type: meal_type.unwrap_or(self.deps.default_meal_type),
                    now: Utc::now(),
                };
                match self.apply(input) {
                    Ok(_) => self.commit_reply = Some(reply),
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }

            ScanCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }

            ScanCommand::HealthCheck { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        let result = match done {
            Completion::Acquired { result, reply } => {
                let _ = reply.send(self.finish_acquire(result));
                return;
            }
            Completion::Analysis {
                generation,
                outcome,
            } => self.apply(ScanInput::AnalysisFinished {
                generation,
                outcome,
            }),
            Completion::RetryDue { generation } => self.apply(ScanInput::RetryDue { generation }),
            Completion::Commit {
                generation,
                outcome,
            } => {
                let reply_outcome = outcome.clone();
                let result = self.apply(ScanInput::CommitFinished {
                    generation,
                    outcome,
                });
                if let Some(reply) = self.commit_reply.take() {
                    let _ = reply.send(reply_outcome);
                }
                result
            }
        };

        if let Err(e) = result {
            error!("处理后台任务结果失败: {}", e);
        }
    }

    /// 在后台任务中打开相机或图库，同一时间只允许一个
    fn start_acquire(
        &mut self,
        use_camera: bool,
        reply: oneshot::Sender<Result<SourceReply, ScanError>>,
    ) {
        if self.session.is_committing() {
            let _ = reply.send(Err(ScanError::Busy("饮食记录正在提交")));
            return;
        }
        if self.acquiring {
            let _ = reply.send(Err(ScanError::Busy("相机或图库已打开")));
            return;
        }

        self.acquiring = true;
        let source = self.deps.source.clone();
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = acquire_image(&source, use_camera).await;
            let _ = tx.send(Completion::Acquired { result, reply });
        });
    }

    /// 把拍照/选图结果交给状态机
    fn finish_acquire(&mut self, result: Result<Acquired, ScanError>) -> Result<SourceReply, ScanError> {
        self.acquiring = false;

        match result? {
            Acquired::Ready { image, payload } => {
                self.apply(ScanInput::ImageReady { image, payload })?;
                Ok(SourceReply::Started(self.session.snapshot()))
            }
            Acquired::Rejected { image, reason } => {
                self.apply(ScanInput::ImageRejected {
                    image,
                    reason: reason.clone(),
                })?;
                Err(ScanError::InvalidImage(reason))
            }
            Acquired::Cancelled => Ok(SourceReply::Cancelled(self.session.snapshot())),
        }
    }

    /// 把输入交给状态机并执行副作用，返回是否需要重新拍照
    fn apply(&mut self, input: ScanInput) -> Result<bool, ScanError> {
        let effects = self.session.apply(input)?;
        let mut capture_requested = false;

        for effect in effects {
            match effect {
                Effect::Analyze {
                    generation,
                    attempt,
                    payload,
                } => {
                    self.abort_pending();
                    info!("发起图片分析 (generation {}, 重试 {})", generation, attempt);
                    let analyzer = self.deps.analyzer.clone();
                    let tx = self.completion_tx.clone();
                    self.pending = Some(tokio::spawn(async move {
                        let outcome = analyzer.analyze(&payload).await;
                        let _ = tx.send(Completion::Analysis {
                            generation,
                            outcome,
                        });
                    }));
                }

                Effect::ScheduleRetry { generation, delay } => {
                    self.abort_pending();
                    let sleeper = self.deps.sleeper.clone();
                    let tx = self.completion_tx.clone();
                    self.pending = Some(tokio::spawn(async move {
                        sleeper.sleep(delay).await;
                        let _ = tx.send(Completion::RetryDue { generation });
                    }));
                }

                Effect::CancelPending => self.abort_pending(),

                Effect::RequestCapture => capture_requested = true,

                Effect::SubmitLog { generation, entry } => {
                    let sink = self.deps.log_sink.clone();
                    let tx = self.completion_tx.clone();
                    // 提交任务不会被中止，避免重复写入
                    tokio::spawn(async move {
                        let outcome = sink.submit(&entry).await;
                        let _ = tx.send(Completion::Commit {
                            generation,
                            outcome,
                        });
                    });
                }

                Effect::Emit(event) => self.deps.events.publish(event),
            }
        }

        Ok(capture_requested)
    }

    fn abort_pending(&mut self) {
        if let Some(task) = self.pending.take() {
            if !task.is_finished() {
                warn!("中止进行中的分析任务");
            }
            task.abort();
        }
    }
}

/// 拍照或选图并编码
async fn acquire_image(source: &ImageSource, use_camera: bool) -> Result<Acquired, ScanError> {
    let image = if use_camera {
        match source.capture().await? {
            CaptureOutcome::Captured(image) => image,
            CaptureOutcome::Denied => return Err(ScanError::PermissionDenied),
            CaptureOutcome::Cancelled => return Ok(Acquired::Cancelled),
        }
    } else {
        match source.pick().await? {
            PickOutcome::Selected(image) => image,
            PickOutcome::Cancelled => return Ok(Acquired::Cancelled),
        }
    };

    match UploadEncoder::encode(&image).await {
        Ok(payload) => Ok(Acquired::Ready { image, payload }),
        Err(ScanError::InvalidImage(reason)) => Ok(Acquired::Rejected { image, reason }),
        Err(e) => Err(e),
    }
}

/// Scan Handle（用于与Actor通信，可克隆）
#[derive(Clone)]
pub struct ScanHandle {
    sender: mpsc::Sender<ScanCommand>,
}

impl ScanHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ScanCommand,
    ) -> Result<T, ScanError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| ScanError::SessionClosed)?;
        rx.await.map_err(|_| ScanError::SessionClosed)
    }

    /// 拍照并开始分析
    pub async fn capture(&self) -> Result<SourceReply, ScanError> {
        self.request(|reply| ScanCommand::Capture { reply }).await?
    }

    /// 从图库选图并开始分析
    pub async fn pick(&self) -> Result<SourceReply, ScanError> {
        self.request(|reply| ScanCommand::Pick { reply }).await?
    }

    /// 不是食物时重拍
    pub async fn retake(&self) -> Result<SourceReply, ScanError> {
        self.request(|reply| ScanCommand::Retake { reply }).await?
    }

    /// 手动重试，重试计数归零
    pub async fn try_again(&self) -> Result<ScanSnapshot, ScanError> {
        self.request(|reply| ScanCommand::TryAgain { reply }).await?
    }

    pub async fn cancel(&self) -> Result<ScanSnapshot, ScanError> {
        self.request(|reply| ScanCommand::Cancel { reply }).await?
    }

    /// 提交饮食记录（不指定餐次时使用配置的默认餐次）
    pub async fn commit(&self, meal_type: Option<MealType>) -> Result<LoggedFood, ScanError> {
        self.request(|reply| ScanCommand::Commit { meal_type, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<ScanSnapshot, ScanError> {
        self.request(|reply| ScanCommand::Snapshot { reply }).await
    }

    /// 健康检查
    /// 返回true表示Actor正常运行，超时时间为5秒
    pub async fn health_check(&self) -> bool {
        let (reply, rx) = oneshot::channel();

        if self
            .sender
            .send(ScanCommand::HealthCheck { reply })
            .await
            .is_err()
        {
            tracing::warn!("扫描会话 Actor 健康检查失败: 通道已关闭");
            return false;
        }

        match tokio::time::timeout(std::time::Duration::from_secs(5), rx).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                tracing::warn!("扫描会话 Actor 健康检查失败: Actor已停止");
                false
            }
            Err(_) => {
                tracing::warn!("扫描会话 Actor 健康检查失败: 超时(5秒)");
                false
            }
        }
    }
}
