//! In-page JavaScript snippets.
//!
//! Every snippet starts with a `/* th:... */` marker so scripted test
//! drivers can dispatch on it without parsing JS. The snippets return plain
//! JSON; all interpretation happens in Rust.

/// Marker prefixes, shared with the fake driver.
pub const MARKER_CARDS: &str = "th:collect-cards";
pub const MARKER_CUTOFF: &str = "th:recommendation-cutoff";
pub const MARKER_SORT_TAB: &str = "th:sort-tab";
pub const MARKER_EXPAND: &str = "th:expand-one";
pub const MARKER_SCROLL_LAST: &str = "th:scroll-last-card";
pub const MARKER_SCROLL_COLUMN: &str = "th:scroll-column-bottom";
pub const MARKER_SCROLL_WINDOW: &str = "th:scroll-window";
pub const MARKER_SCROLL_BOTTOM: &str = "th:scroll-to-bottom";

/// Snapshot every post card currently in the DOM. Returns an array of
/// objects: status-id candidates (with a flag for the `<time>`-anchored
/// one), body text, author line, engagement counts as raw strings, media
/// flags, card title, and the bounding-box top.
pub const COLLECT_CARDS: &str = r#"/* th:collect-cards */
(() => {
    const cards = [];
    for (const article of document.querySelectorAll('article[data-testid="tweet"]')) {
        const ids = [];
        for (const anchor of article.querySelectorAll('a[href*="/status/"]')) {
            const match = anchor.getAttribute('href').match(/\/status\/(\d+)/);
            if (!match) continue;
            ids.push({ id: match[1], hasTime: anchor.querySelector('time') !== null });
        }

        const textNode = article.querySelector('[data-testid="tweetText"]');
        const userNode = article.querySelector('[data-testid="User-Name"]');
        const timeNode = article.querySelector('time');
        const cardNode = article.querySelector('[data-testid="card.wrapper"]');

        const count = (testid) => {
            const button = article.querySelector(`[data-testid="${testid}"]`);
            if (!button) return '';
            const span = button.querySelector('span span');
            return span ? span.innerText : '';
        };

        cards.push({
            ids,
            text: textNode ? textNode.innerText : '',
            author: userNode ? userNode.innerText.replace(/\n/g, '').replace(/·.*$/, '') : '',
            top: article.getBoundingClientRect().top + window.scrollY,
            datetime: timeNode ? timeNode.getAttribute('datetime') : null,
            likes: count('like') || count('unlike'),
            replies: count('reply'),
            reposts: count('retweet'),
            hasPhoto: article.querySelector('[data-testid="tweetPhoto"]') !== null,
            hasVideo: article.querySelector('[data-testid="videoPlayer"]') !== null
                || article.querySelector('video') !== null,
            cardTitle: cardNode ? cardNode.innerText.split('\n')[0] : null,
        });
    }
    return cards;
})()"#;

/// Absolute y of the first heading under the primary column matching the
/// recommendation labels, or null when the page has no recommendation
/// section yet.
pub fn recommendation_cutoff(pattern: &str) -> String {
    format!(
        r#"/* th:recommendation-cutoff */
(() => {{
    const re = new RegExp({pattern:?}, 'i');
    const column = document.querySelector('[data-testid="primaryColumn"]') || document;
    for (const heading of column.querySelectorAll('h2, [role="heading"]')) {{
        if (re.test(heading.innerText || '')) {{
            return heading.getBoundingClientRect().top + window.scrollY;
        }}
    }}
    return null;
}})()"#
    )
}

/// Click the sort tab whose label matches; true when a click happened.
pub fn sort_tab(pattern: &str) -> String {
    format!(
        r#"/* th:sort-tab */
(() => {{
    const re = new RegExp({pattern:?}, 'i');
    for (const tab of document.querySelectorAll('[role="tab"]')) {{
        if (re.test(tab.innerText || '')) {{
            if (tab.getAttribute('aria-selected') === 'true') return false;
            tab.click();
            return true;
        }}
    }}
    return false;
}})()"#
    )
}

/// Click the first visible folded-branch expansion button; true when one
/// was clicked. Called repeatedly so the page can settle between clicks.
pub fn expand_one(pattern: &str) -> String {
    format!(
        r#"/* th:expand-one */
(() => {{
    const re = new RegExp({pattern:?}, 'i');
    for (const button of document.querySelectorAll('button, [role="button"]')) {{
        const label = (button.innerText || '').trim();
        if (label && re.test(label) && button.offsetParent !== null) {{
            button.click();
            return true;
        }}
    }}
    return false;
}})()"#
    )
}

pub const SCROLL_LAST_CARD: &str = r#"/* th:scroll-last-card */
(() => {
    const cards = document.querySelectorAll('article[data-testid="tweet"]');
    if (cards.length) cards[cards.length - 1].scrollIntoView({ block: 'end' });
    return null;
})()"#;

pub const SCROLL_COLUMN_BOTTOM: &str = r#"/* th:scroll-column-bottom */
(() => {
    const column = document.querySelector('[data-testid="primaryColumn"]');
    if (column) column.scrollTop = column.scrollHeight;
    return null;
})()"#;

pub fn scroll_window(pixels: u32) -> String {
    format!(
        r#"/* th:scroll-window */
(() => {{ window.scrollBy(0, {pixels}); return null; }})()"#
    )
}

pub const SCROLL_TO_BOTTOM: &str = r#"/* th:scroll-to-bottom */
(() => { window.scrollTo(0, document.body.scrollHeight); return null; })()"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippets_carry_their_markers() {
        assert!(COLLECT_CARDS.contains(MARKER_CARDS));
        assert!(recommendation_cutoff("more posts").contains(MARKER_CUTOFF));
        assert!(sort_tab("latest").contains(MARKER_SORT_TAB));
        assert!(expand_one("show more").contains(MARKER_EXPAND));
        assert!(SCROLL_LAST_CARD.contains(MARKER_SCROLL_LAST));
        assert!(SCROLL_COLUMN_BOTTOM.contains(MARKER_SCROLL_COLUMN));
        assert!(scroll_window(1600).contains(MARKER_SCROLL_WINDOW));
        assert!(SCROLL_TO_BOTTOM.contains(MARKER_SCROLL_BOTTOM));
    }

    #[test]
    fn parameterized_snippets_embed_their_inputs() {
        assert!(scroll_window(1600).contains("1600"));
        assert!(sort_tab("latest|最新").contains("latest|最新"));
    }
}
