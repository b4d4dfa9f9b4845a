//! 流程状态机的基础类型：分支、步骤、输入
//!
//! 回调数据沿用 `prefix:rest` 约定：menu:print / nav:back / about:eq /
//! set:material:PLA / submit:order。解析失败不报错，交给引擎按「未识别输入」
//! 回退到主菜单。

use serde::{Deserialize, Serialize};

/// 主菜单分支；dialog 是表单之外自由文本的兜底分支
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Print,
    Scan,
    Idea,
    About,
    Dialog,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Print => "print",
            Branch::Scan => "scan",
            Branch::Idea => "idea",
            Branch::About => "about",
            Branch::Dialog => "dialog",
        }
    }

    pub fn parse(s: &str) -> Option<Branch> {
        match s {
            "print" => Some(Branch::Print),
            "scan" => Some(Branch::Scan),
            "idea" => Some(Branch::Idea),
            "about" => Some(Branch::About),
            "dialog" => Some(Branch::Dialog),
            _ => None,
        }
    }

    /// 摘要头部的分支标题
    pub fn title(&self) -> &'static str {
        match self {
            Branch::Print => "Рассчитать печать",
            Branch::Scan => "3D-сканирование",
            Branch::Idea => "Нет модели / Хочу придумать",
            Branch::About => "О нас",
            Branch::Dialog => "Диалог",
        }
    }
}

/// 状态机步骤。main_menu 是复位态，不进历史栈
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    MainMenu,
    PrintTech,
    PrintMaterial,
    PrintMaterialCustom,
    ScanType,
    IdeaType,
    DescribeTask,
    AttachFile,
    About,
    AboutDetail,
    Result,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::MainMenu => "main_menu",
            Step::PrintTech => "print_tech",
            Step::PrintMaterial => "print_material",
            Step::PrintMaterialCustom => "print_material_custom",
            Step::ScanType => "scan_type",
            Step::IdeaType => "idea_type",
            Step::DescribeTask => "describe_task",
            Step::AttachFile => "attach_file",
            Step::About => "about",
            Step::AboutDetail => "about_detail",
            Step::Result => "result",
        }
    }

    /// 该步骤是否等待一条自由文本来填充字段
    pub fn waiting_field(&self) -> Option<WaitingField> {
        match self {
            Step::PrintMaterialCustom => Some(WaitingField::MaterialCustom),
            Step::DescribeTask => Some(WaitingField::Description),
            _ => None,
        }
    }
}

/// 会话正在等待的自由文本字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitingField {
    MaterialCustom,
    Description,
}

/// 导航按钮
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavAction {
    Back,
    Menu,
}

/// 上传附件的元数据（来自 Telegram document 或最大尺寸的 photo）
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<i64>,
    pub message_id: Option<i64>,
}

/// 发起回合的用户
#[derive(Debug, Clone)]
pub struct UserRef {
    pub id: i64,
    pub username: Option<String>,
    pub full_name: String,
}

impl UserRef {
    pub fn display_name(&self) -> &str {
        if self.full_name.trim().is_empty() {
            "Без имени"
        } else {
            &self.full_name
        }
    }
}

/// 「其他材料」按钮的回调值；摘要中跳过该标记，material_custom 承载实际值
pub const MATERIAL_OTHER: &str = "other";
/// 未知技术时「跳过」按钮写入的材料值
pub const MATERIAL_SKIPPED: &str = "не выбран";
/// 「нет файла」按钮写入的附件值
pub const FILE_SKIPPED: &str = "нет";

/// 一次用户动作，状态机的唯一输入
#[derive(Debug, Clone)]
pub enum FlowInput {
    /// /start 命令
    Start,
    /// 主菜单分支选择（menu:*）
    SelectBranch(Branch),
    /// 返回 / 主菜单（nav:*）
    Nav(NavAction),
    /// «О нас» 子项（about:*）
    AboutDetail(String),
    /// 按钮写字段（set:field:value）
    Set { field: String, value: String },
    /// 提交订单（submit:order）
    Submit,
    /// 自由文本
    Text(String),
    /// 附件上传
    File(FileMeta),
    /// 无法解析的回调数据
    Unknown(String),
}

impl FlowInput {
    /// 解析回调数据；未识别的前缀落到 Unknown（引擎回主菜单）
    pub fn from_callback(data: &str) -> FlowInput {
        if data == "submit:order" {
            return FlowInput::Submit;
        }

        if let Some(rest) = data.strip_prefix("menu:") {
            if let Some(branch) = Branch::parse(rest) {
                return FlowInput::SelectBranch(branch);
            }
            return FlowInput::Unknown(data.to_string());
        }

        if let Some(rest) = data.strip_prefix("nav:") {
            return match rest {
                "back" => FlowInput::Nav(NavAction::Back),
                "menu" => FlowInput::Nav(NavAction::Menu),
                _ => FlowInput::Unknown(data.to_string()),
            };
        }

        if let Some(rest) = data.strip_prefix("about:") {
            return FlowInput::AboutDetail(rest.to_string());
        }

        if let Some(rest) = data.strip_prefix("set:") {
            if let Some((field, value)) = rest.split_once(':') {
                if !field.is_empty() && !value.is_empty() {
                    return FlowInput::Set {
                        field: field.to_string(),
                        value: value.to_string(),
                    };
                }
            }
            return FlowInput::Unknown(data.to_string());
        }

        FlowInput::Unknown(data.to_string())
    }
}
