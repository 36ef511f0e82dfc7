use crate::context::WorkflowCtx;
use crate::errors::Result;
use weave_ai_api as api;

use chrono::{DateTime, Utc};

const HEADER: [&str; 5] = ["NAME", "VERSION", "FAMILY", "STATUS", "CREATED"];

/*
 * Human friendly age of something created at `then`, e.g. "3 days ago".
 * Timestamps in the future read as "now".
 */
pub fn humanize_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = (now - then).to_std().unwrap_or_default();
    timeago::Formatter::new().convert(age)
}

/*
 * Aligns cells in columns separated by two spaces. The last column isn't
 * padded.
 */
pub fn render_table(rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0; columns];
    for row in rows {
	for (i, cell) in row.iter().enumerate() {
	    widths[i] = widths[i].max(cell.chars().count());
	}
    }

    let mut out = String::new();
    for row in rows {
	let mut line = String::new();
	for (i, cell) in row.iter().enumerate() {
	    if i + 1 == row.len() {
		line.push_str(cell);
	    } else {
		line.push_str(&format!("{:width$}  ", cell, width = widths[i]));
	    }
	}
	out.push_str(line.trim_end());
	out.push('\n');
    }
    out
}

pub fn model_row(model: &api::OCIRepository, now: DateTime<Utc>) -> Vec<String> {
    let namespace = model.metadata.namespace.clone().unwrap_or_default();
    let name = model.metadata.name.clone().unwrap_or_default();
    let created = match &model.metadata.creation_timestamp {
	Some(ts) => humanize_since(ts.0, now),
	None => String::new(),
    };

    vec![
	format!("{}/{}", namespace, name),
	model.tag().to_string(),
	model.family().to_string(),
	model.model_status().to_string(),
	created,
    ]
}

/*
 * list_models renders the model catalog of `namespace`, or of every
 * namespace when None.
 */
pub async fn list_models(ctx: &WorkflowCtx<'_>, namespace: Option<&str>) -> Result<String> {
    let selector = format!("{}={}", api::ARTIFACT_KIND_LABEL, api::LANGUAGE_MODEL_KIND);
    let models = ctx.deadline.run("listing models", ctx.store.list_models(namespace, &selector)).await?;
    log::debug!("found {} model(s)", models.len());

    let now = Utc::now();
    let mut rows = vec![HEADER.iter().map(|h| h.to_string()).collect::<Vec<_>>()];
    rows.extend(models.iter().map(|model| model_row(model, now)));

    Ok(render_table(&rows))
}
