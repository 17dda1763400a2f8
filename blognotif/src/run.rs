//! One polling pass over every configured blog.
//!
//! Blogs are handled one after another in listing order. Whatever goes wrong with one blog is
//! logged and recorded in its [`BlogOutcome`]; the pass always moves on to the next blog.

use anyhow::Result;
use tracing::{debug, error, info};

use crate::fetcher::Fetcher;
use crate::notifier::{render, Notifier};
use crate::recipe;
use crate::repository::{BlogDefinition, BlogRepository};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Detect changes and log them, but neither notify nor persist.
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlogOutcome {
    FetchFailed,
    /// The recipe produced nothing for the fetched page.
    NoArticle,
    Unchanged,
    /// A new link was found in dry-run mode.
    WouldNotify(String),
    Notified(String),
    /// Sending failed; the stored link was left as is.
    NotifyFailed(String),
    /// Notification went out but the new link could not be stored.
    PersistFailed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub checked: usize,
    pub fetch_failed: usize,
    pub no_article: usize,
    pub unchanged: usize,
    pub notified: usize,
    pub notify_failed: usize,
    pub persist_failed: usize,
    pub would_notify: usize,
}

impl PassReport {
    fn record(&mut self, outcome: &BlogOutcome) {
        self.checked += 1;
        match outcome {
            BlogOutcome::FetchFailed => self.fetch_failed += 1,
            BlogOutcome::NoArticle => self.no_article += 1,
            BlogOutcome::Unchanged => self.unchanged += 1,
            BlogOutcome::WouldNotify(_) => self.would_notify += 1,
            BlogOutcome::Notified(_) => self.notified += 1,
            BlogOutcome::NotifyFailed(_) => self.notify_failed += 1,
            // the message was delivered even though the state write failed
            BlogOutcome::PersistFailed(_) => {
                self.notified += 1;
                self.persist_failed += 1;
            }
        }
    }
}

/// Check every blog once. Only a failure to list the blogs aborts the pass.
pub async fn run_pass(
    repo: &BlogRepository,
    fetcher: &Fetcher,
    notifier: &dyn Notifier,
    options: RunOptions,
) -> Result<PassReport> {
    let blogs = repo.list_blogs().await?;
    info!("run: checking {} blogs", blogs.len());

    let mut report = PassReport::default();
    for blog in &blogs {
        let outcome = check_blog(repo, fetcher, notifier, blog, options).await;
        debug!(blog = %blog.name, ?outcome, "run: blog done");
        report.record(&outcome);
    }

    info!(
        checked = report.checked,
        notified = report.notified,
        unchanged = report.unchanged,
        no_article = report.no_article,
        fetch_failed = report.fetch_failed,
        notify_failed = report.notify_failed,
        persist_failed = report.persist_failed,
        would_notify = report.would_notify,
        "run: pass complete"
    );
    Ok(report)
}

/// Fetch, extract, compare, notify and persist for a single blog.
pub async fn check_blog(
    repo: &BlogRepository,
    fetcher: &Fetcher,
    notifier: &dyn Notifier,
    blog: &BlogDefinition,
    options: RunOptions,
) -> BlogOutcome {
    let extracted = match fetcher.fetch(&blog.main_url).await {
        Ok(document) => recipe::execute(&blog.steps, &document),
        Err(e) => {
            error!(blog = %blog.name, "Impossible to retrieve latest article: {:#}", e);
            return BlogOutcome::FetchFailed;
        }
    };

    let Some(link) = extracted else {
        info!(blog = %blog.name, url = %blog.main_url, "no article found on page");
        return BlogOutcome::NoArticle;
    };

    if !is_new(repo, blog, &link).await {
        debug!(blog = %blog.name, %link, "latest article already notified");
        return BlogOutcome::Unchanged;
    }

    if options.dry_run {
        info!(blog = %blog.name, %link, "dry run: new article, not notifying");
        return BlogOutcome::WouldNotify(link);
    }

    let sent = match render(&blog.notif_text, &blog.name, &link) {
        Ok(text) => notifier.send(&text).await,
        Err(e) => Err(e.into()),
    };
    if let Err(e) = sent {
        error!(blog = %blog.name, %link, "Impossible to send notification: {:#}", e);
        return BlogOutcome::NotifyFailed(link);
    }
    info!(blog = %blog.name, %link, "notification sent");

    if let Err(e) = repo.set_last_link(blog.id, &link).await {
        error!(
            blog = %blog.name, %link,
            "Impossible to save link as latest article, it will be notified again: {:#}", e
        );
        return BlogOutcome::PersistFailed(link);
    }

    BlogOutcome::Notified(link)
}

/// A link counts as new when it differs from the stored one, when nothing is stored,
/// and when the stored value cannot be read.
async fn is_new(repo: &BlogRepository, blog: &BlogDefinition, link: &str) -> bool {
    match repo.last_link(blog.id).await {
        Ok(Some(last)) => last != link,
        Ok(None) => true,
        Err(e) => {
            error!(
                blog = %blog.name, %link,
                "Impossible to check if link is latest article, treating it as new: {:#}", e
            );
            true
        }
    }
}
