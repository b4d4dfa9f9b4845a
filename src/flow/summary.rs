//! заявка 摘要渲染
//!
//! 同一段文本既是用户确认页，也是持久化的 Order.summary，也是通知群正文。
//! 字段 → 标签为固定表；branch 渲染成头部；空字段跳过；
//! material 为「其他」标记时跳过（material_custom 承载实际值）。

use crate::store::OrderPayload;

use super::step::{Branch, MATERIAL_OTHER};

/// 字段标签（渲染顺序即此表顺序）
const FIELD_LABELS: &[(&str, &str)] = &[
    ("technology", "Технология"),
    ("material", "Материал"),
    ("material_custom", "Материал (свой)"),
    ("scan_type", "Тип сканирования"),
    ("idea_type", "Тип задачи"),
    ("file", "Файл"),
    ("description", "Комментарий"),
];

/// 渲染 payload 摘要；完全为空时返回占位文本
pub fn payload_summary(payload: &OrderPayload) -> String {
    let mut lines = Vec::new();

    if let Some(branch) = payload.branch.as_deref() {
        let title = Branch::parse(branch).map(|b| b.title()).unwrap_or(branch);
        lines.push(format!("• Раздел: {}", title));
    }

    for (field, label) in FIELD_LABELS {
        let value = match *field {
            "technology" => payload.technology.as_deref(),
            "material" => payload.material.as_deref(),
            "material_custom" => payload.material_custom.as_deref(),
            "scan_type" => payload.scan_type.as_deref(),
            "idea_type" => payload.idea_type.as_deref(),
            "file" => payload.file.as_deref(),
            "description" => payload.description.as_deref(),
            _ => None,
        };

        let Some(value) = value else { continue };
        if value.trim().is_empty() {
            continue;
        }
        if *field == "material" && value == MATERIAL_OTHER {
            continue;
        }
        lines.push(format!("• {}: {}", label, value));
    }

    if lines.is_empty() {
        "(пока пусто)".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_renders_placeholder() {
        assert_eq!(payload_summary(&OrderPayload::default()), "(пока пусто)");
    }

    #[test]
    fn branch_becomes_header_and_fields_get_labels() {
        let payload = OrderPayload {
            branch: Some("print".into()),
            technology: Some("FDM".into()),
            material: Some("PLA".into()),
            description: Some("нужно 10 кронштейнов, 5см".into()),
            ..Default::default()
        };

        let summary = payload_summary(&payload);
        assert_eq!(
            summary,
            "• Раздел: Рассчитать печать\n\
             • Технология: FDM\n\
             • Материал: PLA\n\
             • Комментарий: нужно 10 кронштейнов, 5см"
        );
    }

    #[test]
    fn other_material_marker_is_hidden_custom_value_shown() {
        let payload = OrderPayload {
            branch: Some("print".into()),
            technology: Some("FDM".into()),
            material: Some(MATERIAL_OTHER.into()),
            material_custom: Some("переработанный ABS".into()),
            ..Default::default()
        };

        let summary = payload_summary(&payload);
        assert!(!summary.contains("Материал: other"));
        assert!(summary.contains("Материал (свой): переработанный ABS"));
    }

    #[test]
    fn blank_fields_are_skipped() {
        let payload = OrderPayload {
            branch: Some("scan".into()),
            scan_type: Some("Предмет".into()),
            description: Some("   ".into()),
            ..Default::default()
        };

        let summary = payload_summary(&payload);
        assert_eq!(
            summary,
            "• Раздел: 3D-сканирование\n• Тип сканирования: Предмет"
        );
    }

    #[test]
    fn unknown_branch_is_rendered_verbatim() {
        let payload = OrderPayload {
            branch: Some("vip".into()),
            ..Default::default()
        };
        assert_eq!(payload_summary(&payload), "• Раздел: vip");
    }
}
