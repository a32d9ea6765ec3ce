// Formatters for displaying search results, suggestions and answers.
use colored::*;
use serde_json::{json, Value};

use sgsearch_client::client::deep_search::Conversation;
use sgsearch_client::{summarize_match, SearchMatch, SearchResult, SearchSnapshot};

/// One-line description of a match.
pub fn match_label(search_match: &SearchMatch) -> String {
    match search_match {
        SearchMatch::Repo(m) => match m.repo_stars {
            Some(stars) if stars > 0 => format!("{} ({} stars)", m.repository, stars),
            _ => m.repository.clone(),
        },
        SearchMatch::Commit(m) => {
            let subject = m.content.lines().next().unwrap_or_default();
            if subject.is_empty() {
                m.label.clone()
            } else {
                format!("{} {}", m.oid.as_deref().map(short_oid).unwrap_or_default(), subject)
                    .trim()
                    .to_string()
            }
        }
        SearchMatch::Path(m) => format!("{} {}", m.repository, m.path),
        SearchMatch::Content(m) => {
            let count = m.lines.len();
            format!(
                "{} {} ({} {})",
                m.repository,
                m.path,
                count,
                if count == 1 { "match" } else { "matches" }
            )
        }
        SearchMatch::Symbol(m) => {
            let names: Vec<&str> = m.symbols.iter().map(|s| s.name.as_str()).collect();
            format!("{} {} [{}]", m.repository, m.path, names.join(", "))
        }
        SearchMatch::Unsupported(_) => "unsupported result".to_string(),
    }
}

fn short_oid(oid: &str) -> &str {
    oid.get(..7).unwrap_or(oid)
}

/// Print one result as it streams in.
pub fn print_result(index: usize, result: &SearchResult) {
    println!(
        "{}. [{}] {}",
        index + 1,
        result.search_match.kind().cyan(),
        match_label(&result.search_match).bold()
    );
    if let SearchMatch::Content(m) = &result.search_match {
        for line in m.lines.iter().take(3) {
            let text = line.text.lines().next().unwrap_or_default().trim();
            println!("   {:>5}: {}", line.line_number.to_string().dimmed(), text);
        }
    }
    println!("   {}", result.url.blue());
}

/// Print the closing summary of a search: progress, alert and suggestions.
pub fn print_summary(snapshot: &SearchSnapshot) {
    if snapshot.results.is_empty() && snapshot.last_error.is_none() {
        println!("No results found for query: \"{}\"", snapshot.query);
    }
    if !snapshot.summary.is_empty() {
        println!("\n{}", snapshot.summary.green());
    }
    if let Some(detail) = &snapshot.summary_detail {
        println!("{}", detail.dimmed());
    }
    if let Some(alert) = &snapshot.alert {
        println!("\n{} {}", "Alert:".yellow().bold(), alert.title);
        if let Some(description) = &alert.description {
            println!("  {}", description);
        }
    }
    if !snapshot.suggestions.is_empty() {
        println!("\n{}", "Suggestions:".yellow());
        for suggestion in &snapshot.suggestions {
            match &suggestion.query {
                Some(query) => println!(
                    "  - {} ({}): {}",
                    suggestion.title,
                    suggestion.description,
                    query.cyan()
                ),
                None => println!("  - {} ({})", suggestion.title, suggestion.description),
            }
        }
    }
}

/// Machine-readable form of a finished search.
pub fn snapshot_json(snapshot: &SearchSnapshot) -> Value {
    let results: Vec<Value> = snapshot
        .results
        .iter()
        .map(|r| {
            let mut summary = summarize_match(&r.search_match);
            if let Value::Object(map) = &mut summary {
                map.insert("url".to_string(), Value::String(r.url.clone()));
            }
            summary
        })
        .collect();
    let suggestions: Vec<Value> = snapshot
        .suggestions
        .iter()
        .map(|s| json!({"title": s.title, "description": s.description, "query": s.query}))
        .collect();
    json!({
        "query": snapshot.query,
        "results": results,
        "suggestions": suggestions,
        "summary": snapshot.summary,
        "summaryDetail": snapshot.summary_detail,
        "alert": snapshot.alert.as_ref().map(|a| json!({"title": a.title, "description": a.description})),
        "error": snapshot.last_error.as_ref().map(|e| e.to_string()),
    })
}

/// Print the answer to the latest question of a Deep Search conversation.
pub fn print_conversation(conversation: &Conversation) {
    let Some(question) = conversation.latest_question() else {
        println!("Conversation {} has no questions.", conversation.id);
        return;
    };
    println!("{} {}", "Question:".bold(), question.question);
    if let Some(title) = &question.title {
        println!("{} {}", "Title:".bold(), title);
    }
    if let Some(answer) = &question.answer {
        println!("\n{}", answer);
    }
    if !question.sources.is_empty() {
        println!("\n{}", "Sources:".yellow());
        for source in &question.sources {
            let label = if source.label.is_empty() {
                &source.link
            } else {
                &source.label
            };
            println!("  - {} {}", label, source.link.blue());
        }
    }
    if !question.suggested_followups.is_empty() {
        println!("\n{}", "Follow-up questions:".yellow());
        for followup in &question.suggested_followups {
            println!("  - {}", followup);
        }
    }
    if let Some(url) = &conversation.share_url {
        println!("\n{} {}", "Share:".dimmed(), url);
    }
}
