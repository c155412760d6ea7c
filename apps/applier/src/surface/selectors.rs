use std::fmt;

use crate::surface::{Condition, Selector};

/// Logical UI elements the walker and orchestrator interact with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiElement {
    /// Only rendered for a logged-in session.
    AccountLink,
    ResultLink,
    NextPage,
    Description,
    DescriptionFallback,
    Company,
    ApplyButton,
    /// Shown instead of the apply button on listings applied to before.
    ReapplyButton,
    AlreadyAppliedBanner,
    SendButton,
    ConfirmReapplyButton,
    DismissDialogButton,
    SuccessMessage,
}

impl fmt::Display for UiElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UiElement::AccountLink => "account link",
            UiElement::ResultLink => "result link",
            UiElement::NextPage => "next page link",
            UiElement::Description => "description",
            UiElement::DescriptionFallback => "main content",
            UiElement::Company => "company",
            UiElement::ApplyButton => "apply button",
            UiElement::ReapplyButton => "review resume button",
            UiElement::AlreadyAppliedBanner => "already-applied banner",
            UiElement::SendButton => "send button",
            UiElement::ConfirmReapplyButton => "reapply confirmation",
            UiElement::DismissDialogButton => "dismiss dialog button",
            UiElement::SuccessMessage => "success message",
        };
        f.write_str(name)
    }
}

/// Maps `UiElement`s to selectors for one board.
#[derive(Debug, Clone)]
pub struct SelectorRegistry {
    account_link: Selector,
    result_link: Selector,
    next_page: Selector,
    description: Selector,
    description_fallback: Selector,
    company: Selector,
    apply_button: Selector,
    reapply_button: Selector,
    already_applied_banner: Selector,
    send_button: Selector,
    confirm_reapply_button: Selector,
    dismiss_dialog_button: Selector,
    success_message: Selector,
    success_url_fragment: String,
}

/// XPath for an element of `tag` whose normalized text contains `text`.
fn with_text(tag: &str, text: &str) -> String {
    format!("//{tag}[contains(normalize-space(.), '{text}')]")
}

impl SelectorRegistry {
    /// work.ua, Ukrainian interface.
    pub fn work_ua() -> Self {
        Self {
            account_link: Selector::xpath(with_text("a", "Мій розділ")),
            result_link: Selector::css(r#"h2 a[href*="/jobs/"]"#),
            next_page: Selector::css(r#"a[rel="next"]"#),
            description: Selector::xpath(
                "//h2[normalize-space(.)='Опис вакансії']/following-sibling::*[1]",
            ),
            description_fallback: Selector::css("main"),
            company: Selector::xpath("//a[contains(@href, '/jobs/by-company/')]"),
            apply_button: Selector::xpath(with_text("button", "Відгукнутися")),
            reapply_button: Selector::xpath(with_text("button", "Переглянути резюме")),
            already_applied_banner: Selector::xpath(with_text("p", "Ви вже відгукалися")),
            send_button: Selector::xpath(
                "//button[contains(normalize-space(.), 'Надіслати') \
                 or contains(normalize-space(.), 'Продовжити')]",
            ),
            confirm_reapply_button: Selector::xpath(with_text("button", "Так, відгукнутися")),
            dismiss_dialog_button: Selector::xpath(with_text("button", "Не додавати")),
            success_message: Selector::xpath(
                "//*[contains(text(), 'успішно') or contains(text(), 'Дякуємо') \
                 or contains(text(), 'відгукнулись')]",
            ),
            success_url_fragment: "/sent/".to_string(),
        }
    }

    pub fn selector(&self, element: UiElement) -> &Selector {
        match element {
            UiElement::AccountLink => &self.account_link,
            UiElement::ResultLink => &self.result_link,
            UiElement::NextPage => &self.next_page,
            UiElement::Description => &self.description,
            UiElement::DescriptionFallback => &self.description_fallback,
            UiElement::Company => &self.company,
            UiElement::ApplyButton => &self.apply_button,
            UiElement::ReapplyButton => &self.reapply_button,
            UiElement::AlreadyAppliedBanner => &self.already_applied_banner,
            UiElement::SendButton => &self.send_button,
            UiElement::ConfirmReapplyButton => &self.confirm_reapply_button,
            UiElement::DismissDialogButton => &self.dismiss_dialog_button,
            UiElement::SuccessMessage => &self.success_message,
        }
    }

    pub fn present(&self, element: UiElement) -> Condition {
        Condition::ElementPresent(self.selector(element).clone())
    }

    /// Any sign that the application went through.
    pub fn success_condition(&self) -> Condition {
        Condition::AnyOf(vec![
            Condition::UrlContains(self.success_url_fragment.clone()),
            self.present(UiElement::SuccessMessage),
        ])
    }
}

impl Default for SelectorRegistry {
    fn default() -> Self {
        Self::work_ua()
    }
}
