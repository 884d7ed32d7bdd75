//! Localized email templates.

use crate::jobs::{EmailType, TOKEN_TTL};
use minijinja::{context, Environment};

/// Language used when the recipient's is not available.
pub const FALLBACK_LANGUAGE: &str = "en";

/// Languages with a full template set.
pub const LANGUAGES: [&str; 2] = ["en", "ru"];

/// `(name, source)` pairs. Names are `<language>/<template>/<part>`.
const TEMPLATES: &[(&str, &str)] = &[
    (
        "en/email_confirmation/subject",
        "Confirm your ModBay email address",
    ),
    (
        "en/email_confirmation/body",
        "Hello!\n\n\
         To confirm your email address, open this link:\n\n\
         {{ url }}\n\n\
         The link is valid for {{ days }} days. \
         If you did not sign up for ModBay, ignore this email.\n",
    ),
    (
        "en/single_use_password/subject",
        "Your ModBay one-time password",
    ),
    (
        "en/single_use_password/body",
        "Hello!\n\n\
         Your one-time password is:\n\n\
         {{ password }}\n\n\
         It can be used once within {{ days }} days. \
         If you did not request it, ignore this email.\n",
    ),
    (
        "ru/email_confirmation/subject",
        "Подтвердите адрес электронной почты на ModBay",
    ),
    (
        "ru/email_confirmation/body",
        "Здравствуйте!\n\n\
         Чтобы подтвердить адрес электронной почты, перейдите по ссылке:\n\n\
         {{ url }}\n\n\
         Ссылка действительна {{ days }} дней. \
         Если вы не регистрировались на ModBay, проигнорируйте это письмо.\n",
    ),
    (
        "ru/single_use_password/subject",
        "Ваш одноразовый пароль ModBay",
    ),
    (
        "ru/single_use_password/body",
        "Здравствуйте!\n\n\
         Ваш одноразовый пароль:\n\n\
         {{ password }}\n\n\
         Его можно использовать один раз в течение {{ days }} дней. \
         Если вы его не запрашивали, проигнорируйте это письмо.\n",
    ),
];

/// Rendered subject and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
}

/// Compiled email templates.
#[derive(Debug)]
pub struct EmailTemplates {
    env: Environment<'static>,
}

impl EmailTemplates {
    /// Compile the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns error if a template has a syntax error.
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        for &(name, source) in TEMPLATES {
            env.add_template(name, source)?;
        }
        Ok(Self { env })
    }

    /// Render `email_type` in the language closest to `language`.
    ///
    /// `secret` is the confirmation URL or the one-time password.
    ///
    /// # Errors
    ///
    /// Returns error if rendering fails.
    pub fn render(
        &self,
        email_type: EmailType,
        language: &str,
        secret: &str,
    ) -> Result<RenderedEmail, minijinja::Error> {
        let days = TOKEN_TTL.as_secs() / (24 * 60 * 60);
        let vars = match email_type {
            EmailType::EmailConfirmation => context! { url => secret, days => days },
            EmailType::SingleUsePassword => context! { password => secret, days => days },
        };

        let prefix = format!("{}/{}", resolve_language(language), email_type.template());
        let subject = self
            .env
            .get_template(&format!("{prefix}/subject"))?
            .render(&vars)?;
        let body = self
            .env
            .get_template(&format!("{prefix}/body"))?
            .render(&vars)?;

        Ok(RenderedEmail { subject, body })
    }
}

/// Map a language tag such as `ru-RU` to a supported language.
#[must_use]
pub fn resolve_language(tag: &str) -> &'static str {
    let primary = tag.split(['-', '_']).next().unwrap_or_default();
    LANGUAGES
        .into_iter()
        .find(|lang| lang.eq_ignore_ascii_case(primary))
        .unwrap_or(FALLBACK_LANGUAGE)
}
