use chrono::{Datelike, NaiveDate};

use crate::intake::payload::RequestPayload;
use crate::types::ServiceKind;

const TAROT_TEMPLATE: &str = "Ты — Мира, 42 года. Профессиональный таролог с более чем 20-летним опытом. \
Ты делаешь расклады по имени, дате рождения и конкретным вопросам клиента, вручную и с глубокой проработкой.

Текст — живой, реалистичный, внятный, словно ты лично пишешь клиенту. Без клише и фраз, которые выдают ИИ.

ФОРМАТ РАСКЛАДА:
1. Название расклада
2. Позиции (1, 2, 3…), каждая — отдельная карта, минимум 800 символов анализа в контексте ситуации клиента
3. Финальный блок: Совет от карт Таро

Карты выбираются случайно, повторы и выдуманные карты запрещены.
Сейчас {current_period}. Если расклад подразумевает прогноз, указывай примерное время события — \
только начиная с {earliest_period}. Более ранние даты упоминать запрещено.
Общий объём — минимум 4000 символов.

СТРОГО:
— Обращение к клиенту только на «вы»
— Никаких приветствий и вступлений, расклад начинается с названия
— Последний блок — только Совет от карт Таро

ДАННЫЕ КЛИЕНТА:
{client_data}";

const MATRIX_TEMPLATE: &str = "Ты — Мира, 42 года. Мастер матрицы судьбы с 20-летним опытом. \
Пишешь уверенно и глубоко, работаешь по дате рождения.

СТРУКТУРА:
1. Разбор матрицы судьбы
2. Дата рождения клиента
3. 10 разделов:
— Личность и внутренний стержень
— Карма рода и задачи души
— Предназначение
— Отношения и привязанности
— Финансы и профессиональная реализация
— Страхи, блоки, уязвимости
— Ваши сильные стороны
— Точка роста: где заложен ключ к прорыву
— Предупреждения и временные циклы ({forecast_range})
— Финальный вывод

Сейчас {current_period}; все прогнозы — не раньше, чем с {earliest_period}.
Каждый блок — минимум 900 символов, без воды. Общий объём — не менее 6000 символов.

ОГРАНИЧЕНИЯ:
— Никаких вступлений и завершений
— Обращение к клиенту строго на «вы»
— Упоминание фото или визуальных считываний запрещено

ДАННЫЕ КЛИЕНТА:
{client_data}";

const MONTHS_NOMINATIVE: [&str; 12] = [
    "январь", "февраль", "март", "апрель", "май", "июнь", "июль", "август", "сентябрь", "октябрь",
    "ноябрь", "декабрь",
];
const MONTHS_GENITIVE: [&str; 12] = [
    "января", "февраля", "марта", "апреля", "мая", "июня", "июля", "августа", "сентября",
    "октября", "ноября", "декабря",
];

/// Years covered by the forecast section, counting the current one.
pub const FORECAST_SPAN_YEARS: i32 = 3;

/// Calendar labels frozen into a prompt when it is built. Generated text
/// carries them, so a delayed delivery never shifts the forecast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeWindow {
    /// e.g. "октябрь 2026 года"
    pub current_period: String,
    /// e.g. "октября 2026 года"
    pub earliest_period: String,
    pub forecast_from: i32,
    pub forecast_to: i32,
}

impl TimeWindow {
    pub fn at(date: NaiveDate) -> Self {
        let month = date.month0() as usize;
        let year = date.year();
        Self {
            current_period: format!("{} {year} года", MONTHS_NOMINATIVE[month]),
            earliest_period: format!("{} {year} года", MONTHS_GENITIVE[month]),
            forecast_from: year,
            forecast_to: year + FORECAST_SPAN_YEARS - 1,
        }
    }

    pub fn forecast_range(&self) -> String {
        format!("{}–{}", self.forecast_from, self.forecast_to)
    }
}

pub fn template(service: ServiceKind) -> &'static str {
    match service {
        ServiceKind::Tarot => TAROT_TEMPLATE,
        ServiceKind::Matrix => MATRIX_TEMPLATE,
    }
}

/// Fill the service template with the client's data and the time window.
pub fn render(payload: &RequestPayload, window: &TimeWindow) -> String {
    template(payload.service)
        .replace("{current_period}", &window.current_period)
        .replace("{earliest_period}", &window.earliest_period)
        .replace("{forecast_range}", &window.forecast_range())
        .replace("{client_data}", payload.client_block().trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, UserId};

    fn payload(service: ServiceKind) -> RequestPayload {
        RequestPayload {
            user: UserId(1),
            service,
            fields: vec![
                (Field::Name, "Анна".into()),
                (Field::BirthDate, "07.03.1991".into()),
            ],
        }
    }

    #[test]
    fn window_labels_follow_the_date() {
        let w = TimeWindow::at(NaiveDate::from_ymd_opt(2025, 7, 3).expect("valid date"));
        assert_eq!(w.current_period, "июль 2025 года");
        assert_eq!(w.earliest_period, "июля 2025 года");
        assert_eq!(w.forecast_range(), "2025–2027");
    }

    #[test]
    fn render_leaves_no_placeholders() {
        let w = TimeWindow::at(NaiveDate::from_ymd_opt(2026, 12, 31).expect("valid date"));
        for service in ServiceKind::ALL {
            let prompt = render(&payload(service), &w);
            assert!(!prompt.contains('{'), "unfilled placeholder in {service:?}");
            assert!(prompt.contains("Анна"));
            assert!(prompt.contains("декабря 2026 года"));
        }
    }

    #[test]
    fn matrix_prompt_carries_forecast_range() {
        let w = TimeWindow::at(NaiveDate::from_ymd_opt(2026, 1, 1).expect("valid date"));
        let prompt = render(&payload(ServiceKind::Matrix), &w);
        assert!(prompt.contains("(2026–2028)"));
    }
}
