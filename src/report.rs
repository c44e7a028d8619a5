// src/report.rs
//! Text bodies of the completion and error notices.

/// One section per trawler with something to say: `Trawler: <id>` then its
/// rendering. Empty renderings are skipped; all empty means no notice.
pub fn completion_body<'a, I>(sections: I) -> String
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    sections
        .into_iter()
        .filter(|(_, rendered)| !rendered.trim().is_empty())
        .map(|(id, rendered)| format!("Trawler: {id}\n{}", rendered.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// All runtime errors of a run folded into one notice body.
pub fn error_body(errors: &[String]) -> String {
    match errors {
        [] => String::new(),
        [one] => format!("Trawler failed:\n{one}"),
        many => format!(
            "{} trawler errors:\n{}",
            many.len(),
            many.iter().map(|e| format!("- {e}")).collect::<Vec<_>>().join("\n")
        ),
    }
}
