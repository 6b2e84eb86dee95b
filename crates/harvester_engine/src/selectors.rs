use crate::browser::Locator;

/// Where things live in the single supported feed layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSelectors {
    /// Post elements of the feed, newest first.
    pub post: Locator,
    /// Permalink inside a post element.
    pub post_link: Locator,
    /// Content region of a post opened on its own page.
    pub content: Locator,
    /// Attachment controls inside the content region, in displayed order.
    pub attachments: Locator,
    pub attachment_handler_attribute: String,
    pub attachment_id_attribute: String,
    pub login: LoginSelectors,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSelectors {
    /// Present only for an authenticated session.
    pub profile_link: Locator,
    pub email: Locator,
    pub password: Locator,
    pub submit: Locator,
    /// Shown when the provider asks for a captcha.
    pub captcha_marker: Locator,
    pub captcha_input: Locator,
    /// One-time code input of the verification step.
    pub auth_code_input: Locator,
    /// Captured for diagnostics when login fails.
    pub page_body: Locator,
}

impl Default for FeedSelectors {
    fn default() -> Self {
        Self {
            post: Locator::css(".post"),
            post_link: Locator::xpath(".//a[@class='post_link']"),
            content: Locator::xpath(".//div[@class='_post_content']"),
            attachments: Locator::xpath(
                "div[contains(@class,'wall_post_cont')]\
                 /div[contains(@class,'page_post_sized_thumbs')]\
                 /a[contains(@class,'page_post_thumb_wrap')]",
            ),
            attachment_handler_attribute: "onclick".to_string(),
            attachment_id_attribute: "data-photo-id".to_string(),
            login: LoginSelectors::default(),
        }
    }
}

impl Default for LoginSelectors {
    fn default() -> Self {
        Self {
            profile_link: Locator::id("top_profile_link"),
            email: Locator::id("quick_email"),
            password: Locator::id("quick_pass"),
            submit: Locator::id("quick_login_button"),
            captcha_marker: Locator::id("submit_post_box"),
            captcha_input: Locator::id("authcheck_code"),
            auth_code_input: Locator::id("authcheck_code"),
            page_body: Locator::tag("body"),
        }
    }
}
