//! 内容解析：把 bot_config 的字符串键值包装成带类型的访问器
//!
//! 流程层不直接碰裸字符串配置：每个回合开头取一次快照（一次 get_all），
//! 之后的 text / toggle / photo / visible_menu_items 都是纯函数。
//! 存储故障不外传 —— 快照退化为空表，所有键都落到编译期默认文案。

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BotError;
use crate::store::ConfigStore;

/// 编译期默认文案（bot_config 中对应键为空/缺失时使用）
pub mod defaults {
    pub const WELCOME_MENU_MSG: &str = "Привет! Я бот студии 3D-печати. Выберите нужный раздел:";
    pub const BTN_MENU_PRINT: &str = "📐 Рассчитать печать";
    pub const BTN_MENU_SCAN: &str = "📡 3D-сканирование";
    pub const BTN_MENU_IDEA: &str = "❓ Нет модели / Хочу придумать";
    pub const BTN_MENU_ABOUT: &str = "ℹ️ О нас";

    pub const TEXT_PRINT_TECH: &str = "📐 Выберите технологию печати:";
    pub const TEXT_SELECT_MATERIAL: &str = "Выберите материал:";
    pub const TEXT_DESCRIBE_MATERIAL: &str = "Опишите материал/смолу свободным текстом:";
    pub const TEXT_SCAN_TYPE: &str = "📡 Выберите тип сканирования:";
    pub const TEXT_IDEA_TYPE: &str = "✏️ Выберите направление:";
    pub const TEXT_ATTACH_FILE: &str =
        "Прикрепите STL/3MF/OBJ документ или фото, либо нажмите ❌ У меня нет файла";
    pub const TEXT_DESCRIBE_TASK: &str = "Опишите задачу / детали (свободным текстом):";
    pub const TEXT_RESULT_PREFIX: &str = "Проверьте заявку:";
    pub const TEXT_PRICE_NOTE: &str = "💰 Стоимость уточнит менеджер после проверки.";
    pub const TEXT_SUBMIT_OK: &str =
        "✅ Заявка отправлена! Менеджер скоро напишет вам в этот чат.";
    pub const TEXT_SUBMIT_WARN: &str =
        "⚠️ Не удалось сразу уведомить менеджера, заявка сохранена.";
    pub const TEXT_DIALOG_ACK: &str = "Сообщение получено. Менеджер ответит в этом чате.";
    pub const TEXT_NO_ACTIVE_ORDER: &str = "Сначала создайте заявку через главное меню.";
    pub const TEXT_FILE_RECEIVED: &str =
        "Файл получен ✅\nТеперь опишите задачу/детали (свободным текстом):";
    pub const TEXT_RETRY_LATER: &str =
        "⏳ Сервис временно недоступен. Попробуйте ещё раз через минуту.";

    pub const BTN_PRINT_FDM: &str = "FDM";
    pub const BTN_PRINT_RESIN: &str = "Фотополимер";
    pub const BTN_PRINT_UNKNOWN: &str = "Не знаю";

    pub const BTN_MAT_PETG: &str = "PET-G";
    pub const BTN_MAT_PLA: &str = "PLA";
    pub const BTN_MAT_PETG_CARBON: &str = "PET-G Carbon";
    pub const BTN_MAT_TPU: &str = "TPU";
    pub const BTN_MAT_NYLON: &str = "Нейлон";
    pub const BTN_MAT_OTHER: &str = "🤔 Другой материал";
    pub const BTN_MAT_SKIP: &str = "Пропустить";

    pub const BTN_RESIN_STANDARD: &str = "Стандартная";
    pub const BTN_RESIN_ABS: &str = "ABS-Like";
    pub const BTN_RESIN_TPU: &str = "TPU-Like";
    pub const BTN_RESIN_NYLON: &str = "Nylon-Like";
    pub const BTN_RESIN_OTHER: &str = "🤔 Другая смола";

    pub const BTN_SCAN_HUMAN: &str = "Человек";
    pub const BTN_SCAN_OBJECT: &str = "Предмет";
    pub const BTN_SCAN_INDUSTRIAL: &str = "Промышленный объект";
    pub const BTN_SCAN_OTHER: &str = "Другое";

    pub const BTN_IDEA_PHOTO: &str = "По фото/эскизу";
    pub const BTN_IDEA_AWARD: &str = "Сувенир/награда";
    pub const BTN_IDEA_MASTER: &str = "Мастер-модель";
    pub const BTN_IDEA_SIGN: &str = "Вывески";
    pub const BTN_IDEA_OTHER: &str = "Другое";

    pub const ABOUT_TEXT: &str =
        "🏢 Наша студия — 3D-печать, моделирование и сканирование.\nВыберите раздел:";
    pub const BTN_ABOUT_EQUIPMENT: &str = "🏭 Оборудование";
    pub const BTN_ABOUT_PROJECTS: &str = "🖼 Наши проекты";
    pub const BTN_ABOUT_CONTACTS: &str = "📞 Контакты";
    pub const BTN_ABOUT_MAP: &str = "📍 На карте";
    pub const ABOUT_FALLBACK: &str = "ℹ️ О нас";

    pub const BTN_NAV_BACK: &str = "🔙 Назад";
    pub const BTN_NAV_MENU: &str = "🏠 Главное меню";
    pub const BTN_SUBMIT: &str = "✅ Отправить заявку";
    pub const BTN_NEW_ORDER: &str = "🔁 Новый расчёт";
    pub const BTN_NO_FILE: &str = "❌ У меня нет файла";
}

/// 主菜单项（显示顺序固定）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Print,
    Scan,
    Idea,
    About,
}

/// 内容解析器：持有配置存储与进程级兜底值
pub struct ContentResolver {
    store: Arc<ConfigStore>,
    placeholder_photo: String,
    orders_chat_fallback: String,
}

impl ContentResolver {
    pub fn new(store: Arc<ConfigStore>, placeholder_photo: String, orders_chat_fallback: String) -> Self {
        Self {
            store,
            placeholder_photo,
            orders_chat_fallback,
        }
    }

    /// 取当前配置快照；存储故障时退化为空快照（全部默认值），只记日志
    pub async fn snapshot(&self) -> ContentSnapshot {
        let values = match self.store.get_all().await {
            Ok(values) => values,
            Err(e) => {
                let e = BotError::ConfigUnavailable(e.to_string());
                tracing::warn!("Falling back to default content: {}", e);
                HashMap::new()
            }
        };

        ContentSnapshot {
            values,
            placeholder_photo: self.placeholder_photo.clone(),
            orders_chat_fallback: self.orders_chat_fallback.clone(),
        }
    }
}

/// 单个回合内使用的配置快照；所有访问器都是纯函数
#[derive(Debug, Clone, Default)]
pub struct ContentSnapshot {
    values: HashMap<String, String>,
    placeholder_photo: String,
    orders_chat_fallback: String,
}

impl ContentSnapshot {
    pub fn new(
        values: HashMap<String, String>,
        placeholder_photo: String,
        orders_chat_fallback: String,
    ) -> Self {
        Self {
            values,
            placeholder_photo,
            orders_chat_fallback,
        }
    }

    /// 文案：键缺失或值为空白时返回 default
    pub fn text(&self, key: &str, default: &str) -> String {
        match self.values.get(key) {
            Some(value) if !value.trim().is_empty() => value.clone(),
            _ => default.to_string(),
        }
    }

    /// 开关：缺失/空 ⇒ default；否则大小写不敏感地匹配真值集合
    pub fn toggle(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            Some(value) if !value.is_empty() => {
                matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
            }
            _ => default,
        }
    }

    /// 步骤图片：键值 → 占位图 → 无图（纯文本发送）
    pub fn photo(&self, key: &str) -> Option<String> {
        let direct = self.values.get(key).map(String::as_str).unwrap_or("");
        if !direct.trim().is_empty() {
            return Some(direct.to_string());
        }
        let placeholder = self
            .values
            .get("placeholder_photo_path")
            .map(String::as_str)
            .unwrap_or("");
        if !placeholder.trim().is_empty() {
            return Some(placeholder.to_string());
        }
        if !self.placeholder_photo.trim().is_empty() {
            return Some(self.placeholder_photo.clone());
        }
        None
    }

    /// 主菜单可见项；全部被关掉时强制保留「О нас」，机器人不会变成死胡同
    pub fn visible_menu_items(&self) -> Vec<MenuItem> {
        let mut items = Vec::new();
        if self.toggle("enabled_menu_print", true) {
            items.push(MenuItem::Print);
        }
        if self.toggle("enabled_menu_scan", true) {
            items.push(MenuItem::Scan);
        }
        if self.toggle("enabled_menu_idea", true) {
            items.push(MenuItem::Idea);
        }
        if self.toggle("enabled_menu_about", true) {
            items.push(MenuItem::About);
        }
        if items.is_empty() {
            items.push(MenuItem::About);
        }
        items
    }

    /// 订单通知目的地：bot_config 优先，其次进程级兜底；两者皆空 ⇒ None（静默跳过投递）
    pub fn orders_chat_id(&self) -> Option<String> {
        let raw = self.text("orders_chat_id", &self.orders_chat_fallback);
        let normalized = normalize_chat_id(&raw);
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }
}

/// 清理群 ID：去掉空格；数字（含负号）与 @username 原样返回
pub fn normalize_chat_id(value: &str) -> String {
    value.trim().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(pairs: &[(&str, &str)]) -> ContentSnapshot {
        let values = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ContentSnapshot::new(values, String::new(), String::new())
    }

    #[test]
    fn text_falls_back_on_missing_and_blank() {
        let snap = snapshot(&[("text_price_note", "   ")]);
        assert_eq!(snap.text("welcome_menu_msg", "D"), "D");
        assert_eq!(snap.text("text_price_note", "D"), "D");

        let snap = snapshot(&[("welcome_menu_msg", "Привет")]);
        assert_eq!(snap.text("welcome_menu_msg", "D"), "Привет");
    }

    #[test]
    fn toggle_parses_truthy_values_case_insensitively() {
        for value in ["1", "true", "TRUE", "yes", "On"] {
            let snap = snapshot(&[("enabled_menu_print", value)]);
            assert!(snap.toggle("enabled_menu_print", true), "value {value}");
            assert!(snap.toggle("enabled_menu_print", false), "value {value}");
        }
        for value in ["0", "false", "no"] {
            let snap = snapshot(&[("enabled_menu_print", value)]);
            assert!(!snap.toggle("enabled_menu_print", true), "value {value}");
        }
        // 空值与缺失都回到默认
        let snap = snapshot(&[("enabled_menu_print", "")]);
        assert!(snap.toggle("enabled_menu_print", true));
        assert!(!snap.toggle("enabled_menu_print", false));
        assert!(snapshot(&[]).toggle("enabled_menu_scan", true));
    }

    #[test]
    fn photo_resolution_order() {
        let snap = snapshot(&[("photo_print", "prints.jpg")]);
        assert_eq!(snap.photo("photo_print").unwrap(), "prints.jpg");

        let snap = snapshot(&[("placeholder_photo_path", "ph.jpg")]);
        assert_eq!(snap.photo("photo_print").unwrap(), "ph.jpg");

        let snap = ContentSnapshot::new(HashMap::new(), "compiled.jpg".into(), String::new());
        assert_eq!(snap.photo("photo_print").unwrap(), "compiled.jpg");

        assert!(snapshot(&[]).photo("photo_print").is_none());
    }

    #[test]
    fn menu_never_dead_ends() {
        let snap = snapshot(&[
            ("enabled_menu_print", "0"),
            ("enabled_menu_scan", "0"),
            ("enabled_menu_idea", "0"),
            ("enabled_menu_about", "0"),
        ]);
        assert_eq!(snap.visible_menu_items(), vec![MenuItem::About]);

        let snap = snapshot(&[("enabled_menu_scan", "false")]);
        assert_eq!(
            snap.visible_menu_items(),
            vec![MenuItem::Print, MenuItem::Idea, MenuItem::About]
        );
    }

    #[tokio::test]
    async fn snapshot_degrades_to_defaults_when_store_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}?mode=rwc", dir.path().join("c.db").display());
        let pool = crate::store::connect(&url).await.unwrap();
        let store = Arc::new(ConfigStore::new(pool.clone()));
        store.init_tables().await.unwrap();
        store.set("welcome_menu_msg", "Из базы").await.unwrap();

        let resolver = ContentResolver::new(Arc::clone(&store), String::new(), String::new());
        let snap = resolver.snapshot().await;
        assert_eq!(snap.text("welcome_menu_msg", defaults::WELCOME_MENU_MSG), "Из базы");

        // 存储挂掉后快照退化为编译期默认，不报错
        pool.close().await;
        let snap = resolver.snapshot().await;
        assert_eq!(
            snap.text("welcome_menu_msg", defaults::WELCOME_MENU_MSG),
            defaults::WELCOME_MENU_MSG
        );
        assert!(snap.visible_menu_items().contains(&MenuItem::About));
    }

    #[test]
    fn orders_chat_id_normalizes_and_falls_back() {
        let snap = snapshot(&[("orders_chat_id", " -100 123 ")]);
        assert_eq!(snap.orders_chat_id().unwrap(), "-100123");

        let snap = ContentSnapshot::new(HashMap::new(), String::new(), "@ops".into());
        assert_eq!(snap.orders_chat_id().unwrap(), "@ops");

        assert!(snapshot(&[]).orders_chat_id().is_none());
    }
}
