use std::collections::HashMap;
use std::sync::Arc;

use push_dispatch::clients::template::{SimpleTemplateRenderer, TemplateRenderer};
use push_dispatch::error::RenderError;
use push_dispatch::message::{MessageBuilder, strip_non_anchor_tags};

use crate::support;

/// Test: literal title and text pass through the builder untouched
#[test]
fn test_literal_content_passes_through() {
    let mut builder = MessageBuilder::new(Arc::new(SimpleTemplateRenderer));
    let notification = support::raw_notification("Direct title");

    let message = builder.render(&notification).unwrap();

    assert_eq!(message.title, "Direct title");
    assert_eq!(message.body, "body");
}

/// Test: template rendering substitutes context and prefers the HTML variant
#[test]
fn test_template_rendering_prefers_html_variant() {
    let mut builder = MessageBuilder::new(Arc::new(SimpleTemplateRenderer));
    let mut notification = support::raw_notification("ignored");
    notification.template = Some(support::greeting_template());
    notification.context = support::greeting_context();

    let message = builder.render(&notification).unwrap();

    assert_eq!(message.title, "Hello Ada");
    assert_eq!(
        message.body,
        "You have 3 new <a href=\"/inbox\">messages</a>"
    );
}

/// Test: plain content is used when no HTML variant is declared
#[test]
fn test_template_rendering_falls_back_to_plain_content() {
    let mut template = support::greeting_template();
    template.html_content = None;

    let mut builder = MessageBuilder::new(Arc::new(SimpleTemplateRenderer));
    let mut notification = support::raw_notification("ignored");
    notification.template = Some(template);
    notification.context = support::greeting_context();

    let message = builder.render(&notification).unwrap();

    assert_eq!(message.body, "You have 3 new messages");
}

/// Test: every tag except anchors is stripped, case included
#[test]
fn test_strip_keeps_anchor_tags_only() {
    let stripped = strip_non_anchor_tags("<p>Hi <A HREF='x'>link</A> <B>bold</B></p>");

    assert_eq!(stripped, "Hi <A HREF='x'>link</A> bold");
}

/// Test: rendering is performed once per notification, the second call is a
/// cache hit with an identical result
#[test]
fn test_render_is_cached_per_notification() {
    let renderer = support::CountingRenderer::new();
    let mut builder = MessageBuilder::new(renderer.clone());

    let mut notification = support::raw_notification("ignored");
    notification.template = Some(support::greeting_template());
    notification.context = support::greeting_context();

    let first = builder.render(&notification).unwrap();
    let second = builder.render(&notification).unwrap();

    assert_eq!(first, second);
    // one render for the subject, one for the body
    assert_eq!(renderer.render_count(), 2);
}

/// Test: an unreplaced placeholder surfaces as a render error
#[test]
fn test_missing_variable_propagates() {
    let mut builder = MessageBuilder::new(Arc::new(SimpleTemplateRenderer));
    let mut notification = support::raw_notification("ignored");
    notification.template = Some(support::greeting_template());
    notification.context = HashMap::new();

    let error = builder.render(&notification).unwrap_err();

    assert_eq!(error, RenderError::MissingVariable("{{name}}".to_string()));
    assert_eq!(error.kind(), "MissingVariable");
}
