use std::fmt::Write as _;

use crate::application::pagination::CollectionView;
use crate::application::reconcile::Render;
use crate::domain::entities::{AuthorRecord, PostView};
use crate::domain::posts::format_human_timestamp;

const PENDING_BADGE: &str = " [saving]";
const DRAFT_BADGE: &str = " [draft]";
const REFRESHING_NOTE: &str = "(refreshing…)";

/// One line per post, newest first.
pub fn post_list(render: &Render<'_, CollectionView>) -> String {
    let (list, refreshing) = match render {
        Render::Error(err) => return format!("error: {err}\n"),
        Render::Content {
            data, refreshing, ..
        } => (*data, *refreshing),
    };

    let mut out = String::new();
    if refreshing {
        let _ = writeln!(out, "{REFRESHING_NOTE}");
    }
    if list.is_empty() {
        out.push_str("No posts yet.\n");
        return out;
    }
    for post in &list.posts {
        out.push_str(&post_summary(post));
        out.push('\n');
    }
    if list.has_next_page {
        out.push_str("… more posts available (use --pages)\n");
    }
    out
}

pub fn post_summary(post: &PostView) -> String {
    format!(
        "{id}  {title}{draft}{pending}\n    by {author} · {when}",
        id = post.id(),
        title = post.post.title,
        draft = if post.post.published { "" } else { DRAFT_BADGE },
        pending = if post.is_pending() { PENDING_BADGE } else { "" },
        author = post.author_label(),
        when = format_human_timestamp(post.post.created_at),
    )
}

/// Full post with its body split into paragraphs.
pub fn post_detail(render: &Render<'_, Option<PostView>>) -> String {
    let (post, refreshing) = match render {
        Render::Error(err) => return format!("error: {err}\n"),
        Render::Content {
            data, refreshing, ..
        } => (*data, *refreshing),
    };
    let Some(post) = post else {
        return "Post not found.\n".to_string();
    };

    let mut out = String::new();
    if refreshing {
        let _ = writeln!(out, "{REFRESHING_NOTE}");
    }
    out.push_str(&post_summary(post));
    out.push('\n');
    let _ = writeln!(out, "    avatar: {}", post.author_avatar());
    if let Some(updated_at) = post.post.updated_at {
        let _ = writeln!(out, "    updated {}", format_human_timestamp(updated_at));
    }
    out.push('\n');
    for paragraph in post.paragraphs() {
        let _ = writeln!(out, "{paragraph}");
    }
    out
}

pub fn profile(author: &AuthorRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}  {}", author.id, author.display_label());
    if let Some(username) = &author.username {
        let _ = writeln!(out, "    @{username}");
    }
    let _ = writeln!(out, "    avatar: {}", author.avatar());
    if let Some(bio) = author.bio.as_deref().filter(|bio| !bio.is_empty()) {
        let _ = writeln!(out, "    {bio}");
    }
    if let Some(website) = author.website.as_deref().filter(|site| !site.is_empty()) {
        let _ = writeln!(out, "    {website}");
    }
    if let Some(created_at) = author.created_at {
        let _ = writeln!(out, "    joined {}", format_human_timestamp(created_at));
    }
    out
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use crate::application::repos::SourceError;
    use crate::domain::entities::PostRecord;
    use crate::domain::types::Confirmation;

    use super::*;

    fn view(confirmation: Confirmation, published: bool) -> PostView {
        PostView {
            post: PostRecord {
                id: Uuid::nil(),
                title: "Hello world".to_string(),
                body: "First line\nSecond line".to_string(),
                created_at: datetime!(2024-01-02 15:04 UTC),
                updated_at: None,
                published,
                author_id: Uuid::nil(),
                profile_id: None,
            },
            author: None,
            confirmation,
        }
    }

    #[test]
    fn summary_marks_pending_and_draft_posts() {
        let line = post_summary(&view(Confirmation::Pending, false));
        assert!(line.contains("Hello world [draft] [saving]"));
        assert!(line.contains("by Anonymous"));
        assert!(line.contains("January 2, 2024 3:04 PM"));

        let confirmed = post_summary(&view(Confirmation::Confirmed, true));
        assert!(!confirmed.contains(PENDING_BADGE));
        assert!(!confirmed.contains(DRAFT_BADGE));
    }

    #[test]
    fn list_shows_refreshing_note_and_empty_state() {
        let empty = CollectionView::empty();
        let out = post_list(&Render::Content {
            data: &empty,
            refreshing: true,
            live: true,
        });
        assert!(out.starts_with(REFRESHING_NOTE));
        assert!(out.contains("No posts yet."));
    }

    #[test]
    fn detail_prints_paragraphs_and_errors() {
        let post = Some(view(Confirmation::Confirmed, true));
        let out = post_detail(&Render::Content {
            data: &post,
            refreshing: false,
            live: true,
        });
        assert!(out.ends_with("First line\nSecond line\n"));

        let err = SourceError::Timeout;
        assert_eq!(
            post_detail(&Render::Error(&err)),
            "error: request timed out\n"
        );
    }
}
