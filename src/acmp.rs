use async_trait::async_trait;
use derive_builder::Builder;
use html5ever::tree_builder::TreeSink;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::{multipart, Client, Url};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use crate::error::{ChannelError, NavigationError};
use crate::judge::{Language, StatusRow, SubmissionChannel, SubmissionIdentity, TaskSource};
use crate::model::{Task, TaskId};

pub const ACMP_URL: &str = "https://acmp.ru";

#[derive(Debug, Clone, Builder)]
pub struct AcmpConfig {
    #[builder(setter(into), default = "ACMP_URL.to_string()")]
    base_url: String,
    /// Raw `Cookie` header of a logged-in browser session.
    #[builder(setter(into, strip_option), default)]
    cookie: Option<String>,
    #[builder(default = "Duration::from_secs(20)")]
    timeout: Duration,
}

/// acmp.ru over plain HTTP: task pages, the submission form and the status table.
pub struct AcmpClient {
    client: Client,
    base_url: String,
}

#[derive(Debug)]
struct Page {
    url: String,
    body: String,
}

#[derive(Debug, PartialEq, Eq)]
struct SubmitForm {
    action: Url,
    multipart: bool,
    code_field: String,
    fields: Vec<(String, String)>,
}

impl AcmpClient {
    pub fn new(config: AcmpConfig) -> Result<Self, ChannelError> {
        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.cookie {
            let value = HeaderValue::from_str(cookie).map_err(|_| ChannelError::InvalidCookie)?;
            headers.insert(COOKIE, value);
        }
        let client = Client::builder()
            .cookie_store(true)
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn tasks_url(&self) -> String {
        format!("{}/index.asp?main=tasks", self.base_url)
    }

    fn task_url(&self, task_id: &TaskId) -> String {
        format!("{}/index.asp?main=task&id_task={}", self.base_url, task_id)
    }

    fn status_url(&self) -> String {
        format!("{}/index.asp?main=status", self.base_url)
    }

    async fn get(&self, url: &str) -> Result<Page, ChannelError> {
        let res = self.client.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            return Err(ChannelError::Status(status));
        }
        let url = res.url().to_string();
        let body = res.text().await?;
        Ok(Page { url, body })
    }
}

#[async_trait]
impl TaskSource for AcmpClient {
    async fn list_tasks(&self) -> Result<Vec<TaskId>, ChannelError> {
        let page = self.get(&self.tasks_url()).await?;
        Ok(parse_task_links(&page.body))
    }

    async fn fetch_statement(&self, task_id: &TaskId) -> Result<Task, ChannelError> {
        let page = self.get(&self.task_url(task_id)).await?;
        if is_error_page(&page) {
            return Err(NavigationError { url: page.url }.into());
        }
        parse_statement(task_id, &page.body)
    }

    async fn reset(&self) -> Result<(), ChannelError> {
        self.get(&self.tasks_url()).await.map(|_| ())
    }
}

#[async_trait]
impl SubmissionChannel for AcmpClient {
    async fn is_authorized(&self) -> Result<bool, ChannelError> {
        let page = self.get(&self.tasks_url()).await?;
        Ok(is_logged_in(&page.body))
    }

    async fn latest_submission(
        &self,
        identity: &SubmissionIdentity,
    ) -> Result<Option<u64>, ChannelError> {
        let identity = identity.clone().newer_than(None);
        let page = self.get(&self.status_url()).await?;
        let rows = parse_status_rows(&page.body)?;
        Ok(newest_row(rows, &identity).map(|row| row.id))
    }

    async fn submit(
        &self,
        task_id: &TaskId,
        code: &str,
        language: Language,
    ) -> Result<bool, ChannelError> {
        let page = self.get(&self.task_url(task_id)).await?;
        let base = Url::parse(&page.url).map_err(|_| ChannelError::MissingElement("page url"))?;
        let Some(form) = parse_submit_form(&page.body, &base) else {
            debug!(task = %task_id, "no submission form on task page");
            return Ok(false);
        };

        let mut fields = form.fields;
        fields.retain(|(name, _)| name != "lang" && name != &form.code_field);
        fields.push(("lang".to_string(), language.to_string()));
        fields.push((form.code_field, code.to_string()));

        let req = self.client.post(form.action);
        let req = if form.multipart {
            let body = fields
                .into_iter()
                .fold(multipart::Form::new(), |body, (name, value)| body.text(name, value));
            req.multipart(body)
        } else {
            req.form(&fields)
        };
        let res = req.send().await?;
        debug!(task = %task_id, status = %res.status(), "submission posted");
        Ok(res.status().is_success())
    }

    async fn query_status(
        &self,
        identity: &SubmissionIdentity,
    ) -> Result<Option<StatusRow>, ChannelError> {
        let page = self.get(&self.status_url()).await?;
        let rows = parse_status_rows(&page.body)?;
        Ok(newest_row(rows, identity))
    }
}

/// Error pages are recognised by their URL or by their title and main heading. Statements may
/// mention errors themselves, so the rest of the body is not inspected.
fn is_error_page(page: &Page) -> bool {
    if page.url.to_lowercase().contains("error") {
        return true;
    }
    let document = Html::parse_document(&page.body);
    let headings = Selector::parse("title, h1").unwrap();
    let is_error = document
        .select(&headings)
        .any(|node| element_text(node).to_lowercase().contains("ошибка"));
    is_error
}

fn is_logged_in(html: &str) -> bool {
    let document = Html::parse_document(html);
    let links =
        Selector::parse("a[href*=logout], a[href*=\"main=exit\"], a[href*=\"main=user\"]").unwrap();
    let has_link = document.select(&links).next().is_some();
    has_link || html.contains("Выход") || html.contains("Logout")
}

fn parse_task_links(html: &str) -> Vec<TaskId> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    document
        .select(&Selector::parse("a[href*=\"main=task\"]").unwrap())
        .filter_map(|node| node.value().attr("href").and_then(task_id_from_href))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn task_id_from_href(href: &str) -> Option<TaskId> {
    let (_, rest) = href.split_once("id_task=")?;
    let id: String = rest.chars().take_while(char::is_ascii_digit).collect();
    (!id.is_empty()).then(|| TaskId::new(id))
}

fn parse_statement(task_id: &TaskId, html: &str) -> Result<Task, ChannelError> {
    let mut document = Html::parse_document(html);
    let junk: Vec<_> = document
        .select(&Selector::parse("script, style").unwrap())
        .map(|node| node.id())
        .collect();
    for id in junk {
        document.remove_from_parent(&id);
    }

    let title = document
        .select(&Selector::parse("h1").unwrap())
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Unknown task".to_string());

    let statement = match document
        .select(&Selector::parse("td[background*=\"notepad2.gif\"]").unwrap())
        .next()
    {
        Some(cell) => statement_text(cell),
        None => document
            .select(&Selector::parse("meta[name=description]").unwrap())
            .next()
            .and_then(|node| node.value().attr("content"))
            .map(|content| content.trim().to_string())
            .unwrap_or_default(),
    };
    if statement.is_empty() {
        return Err(ChannelError::MissingElement("task statement"));
    }

    Ok(Task {
        id: task_id.clone(),
        title,
        statement,
    })
}

/// Headings, paragraphs and example tables of the statement cell, one block per line.
fn statement_text(cell: ElementRef) -> String {
    let row = Selector::parse("tr").unwrap();
    let col = Selector::parse("th, td").unwrap();
    let mut lines = vec![];
    for node in cell.select(&Selector::parse("h2, p, table").unwrap()) {
        if node.value().name() == "table" {
            for tr in node.select(&row) {
                let cells: Vec<_> = tr.select(&col).map(element_text).collect();
                lines.push(cells.join(" | "));
            }
        } else {
            let text = element_text(node);
            if !text.is_empty() {
                lines.push(text);
            }
        }
    }
    lines.join("\n")
}

fn parse_submit_form(html: &str, base: &Url) -> Option<SubmitForm> {
    let document = Html::parse_document(html);
    let textarea = Selector::parse("textarea[name]").unwrap();
    let (form, code_field) = document
        .select(&Selector::parse("form").unwrap())
        .find_map(|form| {
            let name = form.select(&textarea).next()?.value().attr("name")?;
            Some((form, name.to_string()))
        })?;

    let action = form.value().attr("action").unwrap_or_default();
    let action = base.join(action).ok()?;
    let multipart = form
        .value()
        .attr("enctype")
        .is_some_and(|enctype| enctype.contains("multipart"));
    let fields = form
        .select(&Selector::parse("input[type=hidden][name]").unwrap())
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect();

    Some(SubmitForm {
        action,
        multipart,
        code_field,
        fields,
    })
}

fn parse_status_rows(html: &str) -> Result<Vec<StatusRow>, ChannelError> {
    let document = Html::parse_document(html);
    let table = document
        .select(&Selector::parse("table.refresh").unwrap())
        .next()
        .ok_or(ChannelError::MissingElement("status table"))?;

    let cell = Selector::parse("td").unwrap();
    let rows = table
        .select(&Selector::parse("tr").unwrap())
        .skip(1)
        .filter_map(|tr| {
            let cells: Vec<_> = tr.select(&cell).map(element_text).collect();
            if cells.len() < 6 {
                return None;
            }
            let id = cells[0].parse().ok()?;
            Some(StatusRow {
                id,
                author: cells[2].clone(),
                task: cells[3].clone(),
                verdict: cells[5].clone(),
            })
        })
        .collect();
    Ok(rows)
}

fn newest_row(rows: Vec<StatusRow>, identity: &SubmissionIdentity) -> Option<StatusRow> {
    rows.into_iter()
        .filter(|row| identity.matches(row))
        .max_by_key(|row| row.id)
}

fn element_text(node: ElementRef) -> String {
    let text: String = node.text().collect();
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
