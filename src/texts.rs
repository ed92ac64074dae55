//! User-facing copy. Kept apart from the flow so wording changes never touch
//! state handling.

use crate::types::{Button, Field, Rating, ServiceKind, UserId};

pub const WELCOME: &str = "Здравствуйте!

Первый расклад на Таро или разбор по матрице судьбы — бесплатно. Единственная просьба с моей стороны — оставить потом отзыв.

Выберите, что вам нужно, и отвечайте на вопросы бота по очереди. Перед отправкой вы сможете проверить и исправить любой ответ.

С уважением,
Мира";

pub const HELP: &str = "Как это работает:

1. Нажмите /start и выберите услугу.
2. Ответьте на вопросы по одному — бот подскажет, что нужно.
3. Проверьте данные и нажмите «Подтвердить».
4. Ответ придёт сюда же, обычно в течение 2–3 часов.

Бесплатная консультация — одна на человека.
/cancel — отменить заполнение, /restart — начать заново.";

pub const CHOOSE_SERVICE: &str = "Выберите услугу:";
pub const ALREADY_SERVED: &str =
    "Вы уже получили бесплатную консультацию. Спасибо, что были со мной!";
pub const IN_PROGRESS: &str =
    "Ваша заявка уже в работе. Пожалуйста, дождитесь ответа — я никого не пропускаю.";
pub const CANCELLED: &str = "Заполнение отменено. Чтобы начать заново, нажмите /start.";
pub const NOTHING_TO_CANCEL: &str = "Сейчас нечего отменять. Чтобы начать, нажмите /start.";
pub const TEXT_ONLY: &str = "Пожалуйста, не отправляйте фото или вложения. Только текст.";
pub const USE_BUTTONS: &str = "Пожалуйста, воспользуйтесь кнопками под сообщением.";
pub const PICK_FIELD: &str = "Что вы хотите исправить?";
pub const UNKNOWN_COMMAND: &str = "Не знаю такой команды. Нажмите /help.";

pub const SUBMITTED: &str = "Спасибо, я всё получила!
Ваша заявка ушла ко мне — как только подойду к ней, сразу начну работу.

Обычно отвечаю в течение 2 часов, но всё зависит от загруженности.
Благодарю вас за терпение и доверие!";

pub const FEEDBACK_QUESTION: &str = "Вам понравился разбор?";
pub const RATING_QUESTION: &str = "Спасибо! Как бы вы его оценили?";
pub const FEEDBACK_THANKS: &str = "Спасибо за ответ!";
pub const FEEDBACK_SORRY: &str = "Жаль, что не всё получилось. Спасибо за честность!";

pub const REVIEW_REMINDER: &str = "Если вас устроил расклад или разбор по матрице,
для энергообмена обязательно оставьте отзыв.
Без этого прогноз может не сбыться или пойти совсем иначе.";

pub const NOTHING_TO_RETRY: &str = "Повторять нечего — заявка уже в работе или не найдена.";
pub const RETRY_QUEUED: &str = "Пробую ещё раз. Ответ придёт сюда же.";

pub const ADMIN_UNBLOCK_USAGE: &str = "Использование: /unblock <user_id>";

pub fn admin_unblocked(user: UserId, existed: bool) -> String {
    if existed {
        format!("Пользователь {user} снова может получить бесплатную консультацию.")
    } else {
        format!("У пользователя {user} не было отметки о консультации.")
    }
}

pub fn admin_pending(deliveries: usize, reminders: usize) -> String {
    format!("Ожидают отправки: {deliveries} разборов, {reminders} напоминаний.")
}

pub fn admin_stats(served: usize, sessions: usize, parked: usize) -> String {
    format!("Обслужено: {served}\nАнкет в процессе: {sessions}\nЖдут повтора: {parked}")
}

pub fn admin_error(err: &str) -> String {
    format!("Не удалось выполнить команду: {err}")
}

pub fn generation_failed() -> &'static str {
    "Не получилось подготовить ответ — такое иногда случается. Нажмите «Повторить», чтобы попробовать ещё раз."
}

pub fn human_fallback(contact: &str) -> String {
    format!(
        "Простите, что-то пошло не так на моей стороне. Напишите мне напрямую: {contact} — я всё сделаю вручную."
    )
}

pub fn service_title(kind: ServiceKind) -> &'static str {
    match kind {
        ServiceKind::Tarot => "Расклад Таро",
        ServiceKind::Matrix => "Матрица судьбы",
    }
}

pub fn field_title(field: Field) -> &'static str {
    match field {
        Field::Name => "Имя",
        Field::BirthDate => "Дата рождения",
        Field::Participants => "Другие участники",
        Field::Backstory => "Предыстория",
        Field::Question => "Вопрос",
    }
}

pub fn field_prompt(field: Field) -> &'static str {
    match field {
        Field::Name => "Как вас зовут? Можно без фамилии.",
        Field::BirthDate => "Ваша дата рождения в формате ДД.ММ.ГГГГ:",
        Field::Participants => {
            "Имена и возраст других людей, если вопрос касается не только вас. Если никого — напишите «нет»."
        }
        Field::Backstory => "Кратко опишите предысторию: что происходит сейчас и почему вы обратились.",
        Field::Question => "Сформулируйте чёткий вопрос к картам.",
    }
}

pub fn button_label(button: Button) -> String {
    match button {
        Button::Service(kind) => service_title(kind).to_string(),
        Button::Confirm => "Подтвердить".to_string(),
        Button::Edit => "Исправить".to_string(),
        Button::EditField(field) => field_title(field).to_string(),
        Button::Cancel => "Отмена".to_string(),
        Button::Restart => "Начать заново".to_string(),
        Button::RetryGeneration => "Повторить".to_string(),
        Button::FeedbackYes => "Да".to_string(),
        Button::FeedbackNo => "Нет".to_string(),
        Button::Rate(rating) => rating_label(rating).to_string(),
        Button::SkipRating => "Пропустить".to_string(),
    }
}

fn rating_label(rating: Rating) -> &'static str {
    match rating {
        Rating::Excellent => "Отлично, всё в точку",
        Rating::Good => "Хорошо",
        Rating::Okay => "Нормально",
    }
}
