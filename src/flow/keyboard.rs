//! 渲染指令与键盘构建
//!
//! RenderInstruction 是流程层与投递层之间的边界：流程层只决定发什么
//! （文本 / 键盘 / 图片引用），图片发送失败回退纯文本的策略归投递层。

use crate::content::{defaults, ContentSnapshot, MenuItem};

use super::step::{FILE_SKIPPED, MATERIAL_OTHER};

/// 行内键盘按钮
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub callback_data: String,
}

impl Button {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// 行内键盘（按行排布）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Self { rows }
    }
}

/// 一次回复的渲染指令
#[derive(Debug, Clone)]
pub enum RenderInstruction {
    TextOnly {
        text: String,
        keyboard: Option<Keyboard>,
    },
    TextWithPhoto {
        text: String,
        keyboard: Option<Keyboard>,
        photo: String,
    },
}

impl RenderInstruction {
    pub fn text_only(text: impl Into<String>, keyboard: Option<Keyboard>) -> Self {
        RenderInstruction::TextOnly {
            text: text.into(),
            keyboard,
        }
    }

    /// photo 为 None 时自动退化为纯文本
    pub fn with_photo(
        text: impl Into<String>,
        keyboard: Option<Keyboard>,
        photo: Option<String>,
    ) -> Self {
        match photo {
            Some(photo) => RenderInstruction::TextWithPhoto {
                text: text.into(),
                keyboard,
                photo,
            },
            None => RenderInstruction::TextOnly {
                text: text.into(),
                keyboard,
            },
        }
    }

    pub fn text(&self) -> &str {
        match self {
            RenderInstruction::TextOnly { text, .. } => text,
            RenderInstruction::TextWithPhoto { text, .. } => text,
        }
    }

    pub fn keyboard(&self) -> Option<&Keyboard> {
        match self {
            RenderInstruction::TextOnly { keyboard, .. } => keyboard.as_ref(),
            RenderInstruction::TextWithPhoto { keyboard, .. } => keyboard.as_ref(),
        }
    }

    pub fn photo(&self) -> Option<&str> {
        match self {
            RenderInstruction::TextOnly { .. } => None,
            RenderInstruction::TextWithPhoto { photo, .. } => Some(photo),
        }
    }
}

/// 导航行：可选「Назад」+ 必有「Главное меню」
pub fn nav_row(include_back: bool) -> Vec<Button> {
    let mut row = Vec::new();
    if include_back {
        row.push(Button::new(defaults::BTN_NAV_BACK, "nav:back"));
    }
    row.push(Button::new(defaults::BTN_NAV_MENU, "nav:menu"));
    row
}

/// 主菜单：按开关过滤，空集时强制保留「О нас」
pub fn menu_kb(snap: &ContentSnapshot) -> Keyboard {
    let rows = snap
        .visible_menu_items()
        .into_iter()
        .map(|item| {
            vec![match item {
                MenuItem::Print => Button::new(
                    snap.text("btn_menu_print", defaults::BTN_MENU_PRINT),
                    "menu:print",
                ),
                MenuItem::Scan => Button::new(
                    snap.text("btn_menu_scan", defaults::BTN_MENU_SCAN),
                    "menu:scan",
                ),
                MenuItem::Idea => Button::new(
                    snap.text("btn_menu_idea", defaults::BTN_MENU_IDEA),
                    "menu:idea",
                ),
                MenuItem::About => Button::new(
                    snap.text("btn_menu_about", defaults::BTN_MENU_ABOUT),
                    "menu:about",
                ),
            }]
        })
        .collect();
    Keyboard::new(rows)
}

/// 打印技术选择
pub fn tech_kb(snap: &ContentSnapshot) -> Keyboard {
    let mut rows = Vec::new();
    if snap.toggle("enabled_print_fdm", true) {
        rows.push(vec![Button::new(
            snap.text("btn_print_fdm", defaults::BTN_PRINT_FDM),
            "set:technology:FDM",
        )]);
    }
    if snap.toggle("enabled_print_resin", true) {
        rows.push(vec![Button::new(
            snap.text("btn_print_resin", defaults::BTN_PRINT_RESIN),
            "set:technology:Фотополимер",
        )]);
    }
    if snap.toggle("enabled_print_unknown", true) {
        rows.push(vec![Button::new(
            snap.text("btn_print_unknown", defaults::BTN_PRINT_UNKNOWN),
            "set:technology:Не знаю",
        )]);
    }
    rows.push(nav_row(true));
    Keyboard::new(rows)
}

/// 材料目录：technology 的纯函数
///
/// - 光固化（«Фото…»）→ 四种树脂 + «Другая»
/// - FDM → 五种线材 + «Другой»
/// - 未识别技术 → 单个「Пропустить」
pub fn material_kb(snap: &ContentSnapshot, technology: Option<&str>) -> Keyboard {
    let tech = technology.unwrap_or("").to_lowercase();
    let mut rows: Vec<Vec<Button>> = Vec::new();

    if tech.starts_with("фото") {
        rows.push(vec![Button::new(
            snap.text("btn_resin_standard", defaults::BTN_RESIN_STANDARD),
            "set:material:Смола: стандартная",
        )]);
        rows.push(vec![Button::new(
            snap.text("btn_resin_abs", defaults::BTN_RESIN_ABS),
            "set:material:Смола: ABS-Like",
        )]);
        rows.push(vec![Button::new(
            snap.text("btn_resin_tpu", defaults::BTN_RESIN_TPU),
            "set:material:Смола: TPU-Like",
        )]);
        rows.push(vec![Button::new(
            snap.text("btn_resin_nylon", defaults::BTN_RESIN_NYLON),
            "set:material:Смола: Nylon-Like",
        )]);
        rows.push(vec![Button::new(
            snap.text("btn_resin_other", defaults::BTN_RESIN_OTHER),
            format!("set:material:{MATERIAL_OTHER}"),
        )]);
    } else if tech == "fdm" {
        rows.push(vec![Button::new(
            snap.text("btn_mat_petg", defaults::BTN_MAT_PETG),
            "set:material:PET-G",
        )]);
        rows.push(vec![Button::new(
            snap.text("btn_mat_pla", defaults::BTN_MAT_PLA),
            "set:material:PLA",
        )]);
        rows.push(vec![Button::new(
            snap.text("btn_mat_petg_carbon", defaults::BTN_MAT_PETG_CARBON),
            "set:material:PET-G Carbon",
        )]);
        rows.push(vec![Button::new(
            snap.text("btn_mat_tpu", defaults::BTN_MAT_TPU),
            "set:material:TPU",
        )]);
        rows.push(vec![Button::new(
            snap.text("btn_mat_nylon", defaults::BTN_MAT_NYLON),
            "set:material:Нейлон",
        )]);
        rows.push(vec![Button::new(
            snap.text("btn_mat_other", defaults::BTN_MAT_OTHER),
            format!("set:material:{MATERIAL_OTHER}"),
        )]);
    } else {
        rows.push(vec![Button::new(
            snap.text("btn_mat_skip", defaults::BTN_MAT_SKIP),
            "set:material:skip",
        )]);
    }

    rows.push(nav_row(true));
    Keyboard::new(rows)
}

/// 扫描类型
pub fn scan_kb(snap: &ContentSnapshot) -> Keyboard {
    Keyboard::new(vec![
        vec![Button::new(
            snap.text("btn_scan_human", defaults::BTN_SCAN_HUMAN),
            "set:scan_type:Человек",
        )],
        vec![Button::new(
            snap.text("btn_scan_object", defaults::BTN_SCAN_OBJECT),
            "set:scan_type:Предмет",
        )],
        vec![Button::new(
            snap.text("btn_scan_industrial", defaults::BTN_SCAN_INDUSTRIAL),
            "set:scan_type:Промышленный объект",
        )],
        vec![Button::new(
            snap.text("btn_scan_other", defaults::BTN_SCAN_OTHER),
            "set:scan_type:Другое",
        )],
        nav_row(true),
    ])
}

/// 任务方向（idea 分支）
pub fn idea_kb(snap: &ContentSnapshot) -> Keyboard {
    Keyboard::new(vec![
        vec![Button::new(
            snap.text("btn_idea_photo", defaults::BTN_IDEA_PHOTO),
            "set:idea_type:По фото/эскизу",
        )],
        vec![Button::new(
            snap.text("btn_idea_award", defaults::BTN_IDEA_AWARD),
            "set:idea_type:Сувенир/награда",
        )],
        vec![Button::new(
            snap.text("btn_idea_master", defaults::BTN_IDEA_MASTER),
            "set:idea_type:Мастер-модель",
        )],
        vec![Button::new(
            snap.text("btn_idea_sign", defaults::BTN_IDEA_SIGN),
            "set:idea_type:Вывески",
        )],
        vec![Button::new(
            snap.text("btn_idea_other", defaults::BTN_IDEA_OTHER),
            "set:idea_type:Другое",
        )],
        nav_row(true),
    ])
}

/// «О нас» 子菜单
pub fn about_kb(snap: &ContentSnapshot) -> Keyboard {
    Keyboard::new(vec![
        vec![Button::new(
            snap.text("btn_about_equipment", defaults::BTN_ABOUT_EQUIPMENT),
            "about:eq",
        )],
        vec![Button::new(
            snap.text("btn_about_projects", defaults::BTN_ABOUT_PROJECTS),
            "about:projects",
        )],
        vec![Button::new(
            snap.text("btn_about_contacts", defaults::BTN_ABOUT_CONTACTS),
            "about:contacts",
        )],
        vec![Button::new(
            snap.text("btn_about_map", defaults::BTN_ABOUT_MAP),
            "about:map",
        )],
        nav_row(false),
    ])
}

/// 附件步骤：跳过按钮 + 导航
pub fn attach_kb(snap: &ContentSnapshot) -> Keyboard {
    Keyboard::new(vec![
        vec![Button::new(
            snap.text("btn_no_file", defaults::BTN_NO_FILE),
            format!("set:file:{FILE_SKIPPED}"),
        )],
        nav_row(true),
    ])
}

/// 确认步骤：提交 / 重新开始
pub fn result_kb(snap: &ContentSnapshot) -> Keyboard {
    Keyboard::new(vec![
        vec![Button::new(
            snap.text("btn_submit", defaults::BTN_SUBMIT),
            "submit:order",
        )],
        vec![Button::new(
            snap.text("btn_new_order", defaults::BTN_NEW_ORDER),
            "nav:menu",
        )],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn empty_snap() -> ContentSnapshot {
        ContentSnapshot::new(HashMap::new(), String::new(), String::new())
    }

    #[test]
    fn material_catalog_is_a_pure_function_of_technology() {
        let snap = empty_snap();

        // FDM：五种材料 + «Другой» + 导航行
        let fdm = material_kb(&snap, Some("FDM"));
        assert_eq!(fdm.rows.len(), 7);
        assert_eq!(
            fdm.rows[5][0].callback_data,
            format!("set:material:{MATERIAL_OTHER}")
        );

        // 树脂：四种 + «Другая» + 导航行
        let resin = material_kb(&snap, Some("Фотополимер"));
        assert_eq!(resin.rows.len(), 6);
        assert!(resin.rows[0][0].callback_data.contains("Смола"));

        // 未知技术：单个「Пропустить」+ 导航行
        let unknown = material_kb(&snap, Some("Не знаю"));
        assert_eq!(unknown.rows.len(), 2);
        assert_eq!(unknown.rows[0][0].callback_data, "set:material:skip");

        let none = material_kb(&snap, None);
        assert_eq!(none.rows.len(), 2);
    }

    #[test]
    fn menu_kb_respects_toggles() {
        let values: HashMap<String, String> = [
            ("enabled_menu_print".to_string(), "0".to_string()),
            ("enabled_menu_idea".to_string(), "no".to_string()),
        ]
        .into();
        let snap = ContentSnapshot::new(values, String::new(), String::new());

        let kb = menu_kb(&snap);
        let callbacks: Vec<_> = kb
            .rows
            .iter()
            .map(|row| row[0].callback_data.as_str())
            .collect();
        assert_eq!(callbacks, vec!["menu:scan", "menu:about"]);
    }

    #[test]
    fn with_photo_degrades_to_text_only() {
        let instruction = RenderInstruction::with_photo("привет", None, None);
        assert!(matches!(instruction, RenderInstruction::TextOnly { .. }));
        assert!(instruction.photo().is_none());

        let instruction = RenderInstruction::with_photo("привет", None, Some("a.jpg".into()));
        assert_eq!(instruction.photo(), Some("a.jpg"));
    }

    #[test]
    fn nav_row_shapes() {
        assert_eq!(nav_row(true).len(), 2);
        assert_eq!(nav_row(false).len(), 1);
        assert_eq!(nav_row(false)[0].callback_data, "nav:menu");
    }
}
