//! Fixed texts sent to users during the survey.

use super::questionnaire::SurveyAnswers;

/// First message after `/start`.
pub const GREETING: &str = "Здравствуйте! Давайте начнем опрос.";

/// Sent when text arrives from a chat without an active survey.
pub const START_REMINDER: &str = "Пожалуйста, начните с команды /start";

/// Closing line after the summary.
pub const THANK_YOU: &str = "Спасибо за ваши ответы! Мы обработаем вашу заявку.";

/// The five questions, in order. `QUESTIONS[n - 1]` asks question `n`.
pub const QUESTIONS: [&str; 5] = [
    "1/5 Пожалуйста, введите ваше ФИО:",
    "2/5 Укажите вашу специализацию:",
    "3/5 Откуда вы узнали про Портал мастеров?",
    "4/5 Откуда вы?",
    "5/5 Какой email используется на Портале мастеров?",
];

const STATUS_SUCCESS: &str = "✅ Успешно";
const STATUS_FAILURE: &str = "❌ Неуспешно";

/// Compose the application summary sent after the last answer.
///
/// Unanswered fields render as empty strings; in practice all five are set
/// by the time the survey completes.
pub fn summary(answers: &SurveyAnswers, verified: bool) -> String {
    let field = |v: &Option<String>| v.clone().unwrap_or_default();
    let status = if verified {
        STATUS_SUCCESS
    } else {
        STATUS_FAILURE
    };

    format!(
        "Новая заявка:\n\
         1. ФИО: {}\n\
         2. Специализация: {}\n\
         3. Источник: {}\n\
         4. Локация: {}\n\
         5. Email: {}\n\
         6. Статус проверки скидки: {}",
        field(&answers.full_name),
        field(&answers.specialization),
        field(&answers.source),
        field(&answers.location),
        field(&answers.email),
        status,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answers() -> SurveyAnswers {
        SurveyAnswers {
            full_name: Some("Jane Doe".into()),
            specialization: Some("Woodworker".into()),
            source: Some("friend".into()),
            location: Some("Berlin".into()),
            email: Some("jane@example.com".into()),
        }
    }

    #[test]
    fn questions_are_numbered_in_order() {
        for (i, q) in QUESTIONS.iter().enumerate() {
            assert!(q.starts_with(&format!("{}/5 ", i + 1)), "bad prefix: {q}");
        }
    }

    #[test]
    fn summary_lists_all_fields() {
        let text = summary(&answers(), true);
        assert!(text.starts_with("Новая заявка:\n"));
        assert!(text.contains("1. ФИО: Jane Doe\n"));
        assert!(text.contains("2. Специализация: Woodworker\n"));
        assert!(text.contains("3. Источник: friend\n"));
        assert!(text.contains("4. Локация: Berlin\n"));
        assert!(text.contains("5. Email: jane@example.com\n"));
        assert!(text.ends_with("6. Статус проверки скидки: ✅ Успешно"));
    }

    #[test]
    fn summary_failure_marker() {
        let text = summary(&answers(), false);
        assert!(text.ends_with("❌ Неуспешно"));
        assert!(!text.contains("✅"));
    }

    #[test]
    fn summary_with_missing_fields() {
        let text = summary(&SurveyAnswers::default(), false);
        assert!(text.contains("1. ФИО: \n"));
        assert!(text.contains("5. Email: \n"));
    }
}
