//! 流程引擎：订单收集状态机
//!
//! 唯一的分发点按 (当前步骤, 输入类型) 决定迁移，没有第二处注册 handler。
//! 约定：
//! - 先算好下一状态再做 I/O，等待存储/网络时不持有任何会话锁；
//! - 每次写 payload 的前向迁移都把完整快照 + 新渲染的摘要落库，
//!   进程中途崩溃时持久记录与最后一次渲染一致；
//! - 引擎是错误边界：持久化失败 ⇒ 会话复位主菜单 + 通用重试文案，
//!   未识别输入 ⇒ 重发主菜单，存储细节一律不出现在用户面前。

use std::sync::Arc;

use crate::content::{defaults, ContentResolver, ContentSnapshot};
use crate::error::{BotError, BotResult};
use crate::store::OrderRepository;
use crate::submit::SubmissionCoordinator;
use crate::telegram::BotGateway;

use super::keyboard::{
    about_kb, attach_kb, idea_kb, material_kb, menu_kb, nav_row, result_kb, scan_kb, tech_kb,
    Keyboard, RenderInstruction,
};
use super::session::{Session, SessionStore};
use super::step::{
    Branch, FileMeta, FlowInput, NavAction, Step, UserRef, WaitingField, FILE_SKIPPED,
    MATERIAL_OTHER, MATERIAL_SKIPPED,
};
use super::summary::payload_summary;

/// 一个回合的结果：放回会话，或清会话（回主菜单 / 提交完成）
enum TurnOutcome {
    Render(RenderInstruction),
    Reset(RenderInstruction),
}

pub struct FlowEngine {
    sessions: Arc<SessionStore>,
    repo: Arc<OrderRepository>,
    resolver: Arc<ContentResolver>,
    gateway: Arc<dyn BotGateway>,
    submitter: Arc<SubmissionCoordinator>,
}

impl FlowEngine {
    pub fn new(
        sessions: Arc<SessionStore>,
        repo: Arc<OrderRepository>,
        resolver: Arc<ContentResolver>,
        gateway: Arc<dyn BotGateway>,
        submitter: Arc<SubmissionCoordinator>,
    ) -> Self {
        Self {
            sessions,
            repo,
            resolver,
            gateway,
            submitter,
        }
    }

    /// 处理一次用户动作，永远返回可直接发送的渲染指令
    pub async fn handle(&self, user: &UserRef, input: FlowInput) -> RenderInstruction {
        let snap = self.resolver.snapshot().await;
        let mut session = self.sessions.get(user.id).await;
        session.touch();

        // 每个触及订单的回合刷新联系方式；失败不影响流程
        if let Some(order_id) = session.order_id {
            if let Err(e) = self
                .repo
                .update_contact(order_id, user.username.as_deref(), Some(user.display_name()))
                .await
            {
                tracing::warn!(user_id = user.id, order_id, "Contact refresh failed: {}", e);
            }
        }

        match self.run(&snap, user, &mut session, input).await {
            Ok(TurnOutcome::Render(instruction)) => {
                self.sessions.replace(user.id, session).await;
                instruction
            }
            Ok(TurnOutcome::Reset(instruction)) => {
                self.sessions.clear(user.id).await;
                instruction
            }
            Err(BotError::UnrecognizedInput(data)) => {
                tracing::warn!(
                    user_id = user.id,
                    step = session.current_step.as_str(),
                    "Unrecognized input, re-rendering main menu: {}",
                    data
                );
                self.sessions.clear(user.id).await;
                self.render_main(&snap)
            }
            Err(e) => {
                let correlation_id = uuid::Uuid::new_v4();
                tracing::error!(
                    user_id = user.id,
                    step = session.current_step.as_str(),
                    %correlation_id,
                    "Turn failed, resetting session: {}",
                    e
                );
                self.sessions.clear(user.id).await;
                RenderInstruction::text_only(
                    snap.text("text_retry_later", defaults::TEXT_RETRY_LATER),
                    Some(menu_kb(&snap)),
                )
            }
        }
    }

    /// 迁移表本体
    async fn run(
        &self,
        snap: &ContentSnapshot,
        user: &UserRef,
        session: &mut Session,
        input: FlowInput,
    ) -> BotResult<TurnOutcome> {
        match input {
            FlowInput::Start | FlowInput::Nav(NavAction::Menu) => {
                Ok(TurnOutcome::Reset(self.render_main(snap)))
            }

            FlowInput::Nav(NavAction::Back) => match session.go_back() {
                Some(step) => Ok(TurnOutcome::Render(self.render_step(snap, step, session))),
                None => Ok(TurnOutcome::Reset(self.render_main(snap))),
            },

            FlowInput::SelectBranch(Branch::About) => {
                // about 不建订单
                *session = Session::new();
                session.branch = Some(Branch::About);
                session.current_step = Step::About;
                Ok(TurnOutcome::Render(self.render_step(snap, Step::About, session)))
            }

            FlowInput::SelectBranch(branch) => {
                let order_id = self
                    .repo
                    .create(
                        user.id,
                        user.username.as_deref(),
                        Some(user.display_name()),
                        branch.as_str(),
                    )
                    .await?;

                *session = Session::new();
                session.order_id = Some(order_id);
                session.branch = Some(branch);
                session.payload.branch = Some(branch.as_str().to_string());
                self.persist(session).await?;

                let next = match branch {
                    Branch::Print => Step::PrintTech,
                    Branch::Scan => Step::ScanType,
                    Branch::Idea => Step::IdeaType,
                    // dialog 分支不从菜单进入
                    Branch::About | Branch::Dialog => {
                        return Err(BotError::UnrecognizedInput(branch.as_str().to_string()))
                    }
                };
                session.advance(next);
                tracing::info!(user_id = user.id, order_id, branch = branch.as_str(), "Order started");
                Ok(TurnOutcome::Render(self.render_step(snap, next, session)))
            }

            FlowInput::AboutDetail(key) => {
                if session.current_step != Step::About {
                    *session = Session::new();
                    session.branch = Some(Branch::About);
                    session.current_step = Step::About;
                }
                session.advance(Step::AboutDetail);
                Ok(TurnOutcome::Render(self.render_about_detail(snap, &key)))
            }

            FlowInput::Set { field, value } => {
                self.apply_set(snap, session, &field, value).await
            }

            FlowInput::Submit => {
                if session.current_step != Step::Result {
                    return Err(BotError::UnrecognizedInput("submit:order".to_string()));
                }
                let confirmation = self.submitter.submit(snap, user, session).await?;
                Ok(TurnOutcome::Reset(RenderInstruction::text_only(
                    confirmation,
                    Some(Keyboard::new(vec![nav_row(false)])),
                )))
            }

            FlowInput::Text(text) => self.apply_text(snap, user, session, text).await,

            FlowInput::File(meta) => self.apply_file(snap, user, session, meta).await,

            FlowInput::Unknown(data) => Err(BotError::UnrecognizedInput(data)),
        }
    }

    /// 按钮写字段：只在等待该字段的步骤接受，其余视为过期按钮
    async fn apply_set(
        &self,
        snap: &ContentSnapshot,
        session: &mut Session,
        field: &str,
        value: String,
    ) -> BotResult<TurnOutcome> {
        let next = match (session.current_step, field) {
            (Step::PrintTech, "technology") => {
                session.payload.technology = Some(value);
                Step::PrintMaterial
            }
            (Step::PrintMaterial, "material") => {
                if value == MATERIAL_OTHER {
                    session.payload.material = Some(MATERIAL_OTHER.to_string());
                    Step::PrintMaterialCustom
                } else if value == "skip" {
                    session.payload.material = Some(MATERIAL_SKIPPED.to_string());
                    Step::AttachFile
                } else {
                    session.payload.material = Some(value);
                    Step::AttachFile
                }
            }
            (Step::ScanType, "scan_type") => {
                session.payload.scan_type = Some(value);
                Step::DescribeTask
            }
            (Step::IdeaType, "idea_type") => {
                session.payload.idea_type = Some(value);
                Step::DescribeTask
            }
            (Step::AttachFile, "file") => {
                session.payload.file = Some(FILE_SKIPPED.to_string());
                Step::DescribeTask
            }
            _ => {
                return Err(BotError::UnrecognizedInput(format!(
                    "set:{} at {}",
                    field,
                    session.current_step.as_str()
                )))
            }
        };

        self.persist(session).await?;
        session.advance(next);
        Ok(TurnOutcome::Render(self.render_step(snap, next, session)))
    }

    /// 自由文本：填充等待中的字段，或落入 dialog 兜底通道
    async fn apply_text(
        &self,
        snap: &ContentSnapshot,
        user: &UserRef,
        session: &mut Session,
        text: String,
    ) -> BotResult<TurnOutcome> {
        let trimmed = text.trim().to_string();

        match session.waiting_for {
            Some(WaitingField::MaterialCustom) => {
                session.payload.material_custom = Some(trimmed);
                self.persist(session).await?;
                session.advance(Step::AttachFile);
                Ok(TurnOutcome::Render(self.render_step(snap, Step::AttachFile, session)))
            }
            Some(WaitingField::Description) => {
                session.payload.description = Some(trimmed);
                self.persist(session).await?;
                if let Some(order_id) = session.order_id {
                    self.repo.add_message(order_id, "in", &text, None).await?;
                }
                session.advance(Step::Result);
                Ok(TurnOutcome::Render(self.render_step(snap, Step::Result, session)))
            }
            // 表单之外的自由文本：不迁移状态，写进 dialog 订单的流水并固定应答
            None => {
                let order_id = self
                    .repo
                    .find_or_create_active_order(
                        user.id,
                        user.username.as_deref(),
                        Some(user.display_name()),
                    )
                    .await?;
                self.repo.add_message(order_id, "in", &text, None).await?;
                tracing::info!(user_id = user.id, order_id, "Dialog message logged");
                Ok(TurnOutcome::Render(RenderInstruction::text_only(
                    snap.text("text_dialog_ack", defaults::TEXT_DIALOG_ACK),
                    None,
                )))
            }
        }
    }

    /// 附件上传：先镜像到本地（尽力），登记附件行，再转到任务描述
    async fn apply_file(
        &self,
        snap: &ContentSnapshot,
        user: &UserRef,
        session: &mut Session,
        meta: FileMeta,
    ) -> BotResult<TurnOutcome> {
        let Some(order_id) = session.order_id else {
            return Ok(TurnOutcome::Render(RenderInstruction::text_only(
                snap.text("text_no_active_order", defaults::TEXT_NO_ACTIVE_ORDER),
                None,
            )));
        };

        let dest_name = format!(
            "{}_{}",
            user.id,
            meta.file_name.as_deref().unwrap_or("file")
        );
        let local_path = self.gateway.download_attachment(&meta.file_id, &dest_name).await;
        let local_path_str = local_path.as_ref().map(|p| p.display().to_string());

        self.repo
            .add_file(
                order_id,
                &meta.file_id,
                meta.file_name.as_deref(),
                meta.mime_type.as_deref(),
                meta.file_size,
                meta.message_id,
                local_path_str.as_deref(),
            )
            .await?;

        session.payload.file = Some(meta.file_name.unwrap_or_else(|| "файл".to_string()));
        self.persist(session).await?;
        session.advance(Step::DescribeTask);

        Ok(TurnOutcome::Render(RenderInstruction::text_only(
            snap.text("text_file_received", defaults::TEXT_FILE_RECEIVED),
            Some(Keyboard::new(vec![nav_row(true)])),
        )))
    }

    /// 把完整 payload 快照 + 当前摘要落库（没有订单时是 no-op，about 分支如此）
    async fn persist(&self, session: &Session) -> BotResult<()> {
        if let Some(order_id) = session.order_id {
            let summary = payload_summary(&session.payload);
            self.repo
                .update_payload(order_id, &session.payload, Some(&summary))
                .await?;
        }
        Ok(())
    }

    fn render_main(&self, snap: &ContentSnapshot) -> RenderInstruction {
        RenderInstruction::with_photo(
            snap.text("welcome_menu_msg", defaults::WELCOME_MENU_MSG),
            Some(menu_kb(snap)),
            snap.photo("photo_main_menu"),
        )
    }

    /// 渲染任一步骤的提问（前向迁移与「Назад」共用）
    fn render_step(
        &self,
        snap: &ContentSnapshot,
        step: Step,
        session: &Session,
    ) -> RenderInstruction {
        match step {
            Step::MainMenu => self.render_main(snap),
            Step::PrintTech => RenderInstruction::with_photo(
                snap.text("text_print_tech", defaults::TEXT_PRINT_TECH),
                Some(tech_kb(snap)),
                snap.photo("photo_print"),
            ),
            Step::PrintMaterial => RenderInstruction::with_photo(
                snap.text("text_select_material", defaults::TEXT_SELECT_MATERIAL),
                Some(material_kb(snap, session.payload.technology.as_deref())),
                snap.photo("photo_print"),
            ),
            Step::PrintMaterialCustom => RenderInstruction::with_photo(
                snap.text("text_describe_material", defaults::TEXT_DESCRIBE_MATERIAL),
                Some(Keyboard::new(vec![nav_row(true)])),
                snap.photo("photo_print"),
            ),
            Step::ScanType => RenderInstruction::with_photo(
                snap.text("text_scan_type", defaults::TEXT_SCAN_TYPE),
                Some(scan_kb(snap)),
                snap.photo("photo_scan"),
            ),
            Step::IdeaType => RenderInstruction::with_photo(
                snap.text("text_idea_type", defaults::TEXT_IDEA_TYPE),
                Some(idea_kb(snap)),
                snap.photo("photo_idea"),
            ),
            Step::AttachFile => RenderInstruction::with_photo(
                snap.text("text_attach_file", defaults::TEXT_ATTACH_FILE),
                Some(attach_kb(snap)),
                snap.photo("photo_print"),
            ),
            Step::DescribeTask => RenderInstruction::text_only(
                snap.text("text_describe_task", defaults::TEXT_DESCRIBE_TASK),
                Some(Keyboard::new(vec![nav_row(true)])),
            ),
            Step::About => RenderInstruction::with_photo(
                snap.text("about_text", defaults::ABOUT_TEXT),
                Some(about_kb(snap)),
                snap.photo("photo_about"),
            ),
            // about_detail 只从 AboutDetail 输入直接渲染，回退时退到 about
            Step::AboutDetail => self.render_step(snap, Step::About, session),
            Step::Result => {
                let text = format!(
                    "{}\n{}\n\n{}",
                    snap.text("text_result_prefix", defaults::TEXT_RESULT_PREFIX),
                    payload_summary(&session.payload),
                    snap.text("text_price_note", defaults::TEXT_PRICE_NOTE),
                );
                RenderInstruction::text_only(text, Some(result_kb(snap)))
            }
        }
    }

    fn render_about_detail(&self, snap: &ContentSnapshot, key: &str) -> RenderInstruction {
        let (text_key, photo_key) = match key {
            "eq" => ("about_equipment_text", "photo_about_equipment"),
            "projects" => ("about_projects_text", "photo_about_projects"),
            "contacts" => ("about_contacts_text", "photo_about_contacts"),
            "map" => ("about_map_text", "photo_about_map"),
            _ => ("about_text", "photo_about"),
        };
        RenderInstruction::with_photo(
            snap.text(text_key, defaults::ABOUT_FALLBACK),
            Some(Keyboard::new(vec![nav_row(true)])),
            snap.photo(photo_key),
        )
    }
}
