use scraper::node::Node;
use scraper::{ElementRef, Selector};

/// Visible text of an element, with `<br>` as a line break.
pub fn inner_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) if el.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Text held directly by the element, skipping its child elements.
pub fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(&**text),
            _ => None,
        })
        .collect::<String>()
}

pub fn parent_element(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.parent().and_then(ElementRef::wrap)
}

/// Closest enclosing `<article>`, excluding the element itself.
pub fn nearest_article(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|ancestor| ancestor.value().name() == "article")
}

/// Whether `element` sits inside `container` without another article between them.
pub fn owned_by(element: ElementRef<'_>, container: ElementRef<'_>) -> bool {
    nearest_article(element).map(|article| article.id()) == Some(container.id())
}

/// Descendants of `container` matching `selector` that belong to the container
/// itself rather than to a nested post.
pub fn select_owned<'a>(
    container: ElementRef<'a>,
    selector: &'a Selector,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    container
        .select(selector)
        .filter(move |element| owned_by(*element, container))
}

/// Whether an ancestor of `element` strictly inside `container` matches.
pub fn has_ancestor_within(
    element: ElementRef<'_>,
    container: ElementRef<'_>,
    selector: &Selector,
) -> bool {
    element
        .ancestors()
        .take_while(|ancestor| ancestor.id() != container.id())
        .filter_map(ElementRef::wrap)
        .any(|ancestor| selector.matches(&ancestor))
}

/// Whether `a` comes before `b` in document order.
pub fn precedes(a: ElementRef<'_>, b: ElementRef<'_>) -> bool {
    for node in a.tree().root().descendants() {
        if node.id() == a.id() {
            return true;
        }
        if node.id() == b.id() {
            return false;
        }
    }
    false
}

pub fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
