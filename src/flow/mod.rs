//! 对话表单流程：会话、步骤状态机、键盘与摘要渲染
//!
//! 控制流：入站动作 → SessionStore.get → FlowEngine（读 ContentResolver 取文案
//! 与开关，读写 OrderRepository 保证持久一致，写回 SessionStore）→ 渲染指令
//! → 投递层。提交由 SubmissionCoordinator 接管。

mod engine;
mod keyboard;
mod session;
mod step;
mod summary;

pub use engine::FlowEngine;
pub use keyboard::{Button, Keyboard, RenderInstruction};
pub use session::{Session, SessionStore};
pub use step::{
    Branch, FileMeta, FlowInput, NavAction, Step, UserRef, WaitingField, FILE_SKIPPED,
    MATERIAL_OTHER, MATERIAL_SKIPPED,
};
pub use summary::payload_summary;
