//! Prompt rendering per domain
//!
//! The system prompt is rendered once per run with the category table
//! embedded. The user message is rendered once per batch and lists the items
//! as numbered JSON objects, followed by the reply contract.

use serde_json::{Value, json};

use super::{Domain, Record, field_str};

const CLASSIFIER_ROLE: &str = "당신은 CS문의 후처리 유형을 예측하는 모델입니다.\n\
각 카테고리에는 level1(유형_1), level2(유형_2), level3(유형_3)와 함께 description(설명)과 note(비고) 필드가 포함되어 있습니다.\n\n";

const PRE_LABEL_GUIDANCE: &str = "입력 항목에는 content(사용자 문의 텍스트)와 pre_level1~3(상담사 사전 분류 힌트)이 포함됩니다.\n\
pre_level1~3은 참고용 힌트일 뿐 정답이 아닙니다. \
content의 의미가 힌트와 충돌하면 content를 최우선으로 해석하여 재판단하세요.\n";

const CLASSIFICATION_RULES: &str = "분류 시 다음 단계를 따르세요:\n\
1. 문의 내용을 파악하여 가장 적합한 level1, level2, level3 조합을 찾으세요.\n\
2. 여러 유사한 카테고리가 있을 경우, description 필드를 참조하여 더 적합한 카테고리를 선택하세요.\n\
3. note 필드에 예외 상황이나 특별 지시사항이 있는지 확인하고 이를 우선적으로 적용하세요.\n\
4. 모호한 경우 가장 구체적인 description을 가진 카테고리를 선택하세요.\n\n\
5. level3는 상위 분류(level1, level2)와 의미적으로 정합되며, 동일한 표현이 중복되지 않도록 조합하세요.\n\
6. level3는 반드시 해당 level2의 하위 항목으로만 분류하세요. 동일한 level3가 여러 level2에 존재할 경우, \
문의 내용과 문맥상 의미가 가장 정확히 일치하는 조합을 선택하세요.\n\
7. level1의 명칭이 level2 또는 level3로 사용되지 않도록 하며, 분류 체계의 상하 관계를 유지하세요.\n\
8. 분류는 반드시 AVAILABLE_CATEGORIES에 명시된 level1~3 조합 중에서만 선택해야 합니다.\n\
9. 적절한 조합이 없다고 판단될 경우, 가장 가까운 의미의 조합을 선택하고 새 항목은 절대 생성하지 마세요.\n";

/// Render the shared system prompt with the category table embedded
pub fn render_system_prompt(domain: Domain, categories_json: &str) -> String {
    let mut prompt = String::from(CLASSIFIER_ROLE);
    if domain.uses_pre_labels() {
        prompt.push_str(PRE_LABEL_GUIDANCE);
    }
    prompt.push_str(CLASSIFICATION_RULES);
    prompt.push_str("AVAILABLE_CATEGORIES = ");
    prompt.push_str(categories_json);
    prompt
}

/// Render the batch-specific user message
pub fn render_user_message(domain: Domain, items: &[Record]) -> String {
    let id_field = domain.id_field();

    let lines: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(idx, item)| format!("{}. {}", idx + 1, item_line(domain, item)))
        .collect();

    let mut message = format!(
        "다음 문의들을 분류해주세요. 응답은 정확히 다음 항목들에 대해서만, 배열 형태 JSON으로 반환하세요.\n\
         입력된 {id}와 정확히 일치하는 {id}만 결과에 포함해야 합니다.\n\
         항목 개수가 반드시 입력과 동일해야 합니다.\n\n",
        id = id_field
    );
    message.push_str(&lines.join("\n"));
    message.push_str("\n\n주의사항:\n");

    if domain.uses_pre_labels() {
        message.push_str(
            "1) pre_level1~3은 상담사가 사전 부여한 힌트입니다. \
             그러나 문의 텍스트(content)를 최우선으로 해석하여 실제 의미와 다르면 힌트를 무시하고 재판단하세요.\n\
             2) level1~3은 반드시 AVAILABLE_CATEGORIES 중 하나의 조합이어야 합니다. 새 항목을 만들지 마세요.\n\
             3) 반환 스키마는 아래와 같고, 추가 필드를 만들지 마세요.\n\n",
        );
    } else {
        message.push_str(&format!(
            "1. 입력된 문의만 분류하세요. 추가 문의를 만들지 마세요.\n\
             2. 응답은 반드시 아래 스키마에 맞춰주세요.\n\
             3. 응답은 정확히 {}개 항목을 포함해야 합니다.\n\n",
            items.len()
        ));
    }

    message.push_str(&format!(
        "RESPONSE_SCHEMA:\n[{{\"{id}\":\"...\",\"level1\":\"...\",\"level2\":\"...\",\"level3\":\"...\"}}]",
        id = id_field
    ));
    message
}

/// One item as a JSON object, identifier first
fn item_line(domain: Domain, item: &Record) -> String {
    let id_field = domain.id_field();
    let id = Value::String(field_str(item, id_field));
    let content = Value::String(field_str(item, "content"));

    let line = if domain.uses_pre_labels() {
        json!({
            id_field: id,
            "content": content,
            "pre_level1": field_str(item, "pre_level1"),
            "pre_level2": field_str(item, "pre_level2"),
            "pre_level3": field_str(item, "pre_level3"),
        })
    } else {
        json!({ id_field: id, "content": content })
    };
    line.to_string()
}
