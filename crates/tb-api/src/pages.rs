use axum::extract::State;
use axum::response::Html;
use std::fmt::Write;

use crate::{ApiResult, AppState};

struct Milestone {
    year: &'static str,
    title: &'static str,
    description: &'static str,
}

const TIMELINE: &[Milestone] = &[
    Milestone {
        year: "1945",
        title: "Birth",
        description: "Raila Amollo Odinga was born on January 7, 1945, in Maseno, Kenya.",
    },
    Milestone {
        year: "1965",
        title: "Studies Abroad",
        description: "Completed undergraduate studies in engineering in Germany.",
    },
    Milestone {
        year: "1970s",
        title: "Early Political Activism",
        description: "Became active in advocating for democracy and human rights in Kenya.",
    },
    Milestone {
        year: "1982",
        title: "Detained for Fighting for Democracy",
        description: "Imprisoned at the start of his long struggle for multiparty democracy.",
    },
    Milestone {
        year: "1991",
        title: "Return to Politics",
        description: "Re-emerged after detention and exile as a leading opposition voice.",
    },
    Milestone {
        year: "1997",
        title: "Presidential Candidate",
        description: "Ran for president, consolidating opposition support despite losing.",
    },
    Milestone {
        year: "2002",
        title: "NARC Victory",
        description: "Helped unite the opposition and end forty years of single-party rule.",
    },
    Milestone {
        year: "2005",
        title: "Constitutional Referendum",
        description: "Led the campaign that rejected the draft constitution.",
    },
    Milestone {
        year: "2007",
        title: "Presidential Election Controversy",
        description: "Disputed results led to a national crisis.",
    },
    Milestone {
        year: "2008",
        title: "Prime Minister of Kenya",
        description: "Formed the Grand Coalition Government with President Mwai Kibaki.",
    },
    Milestone {
        year: "2010",
        title: "Champion of the New Constitution",
        description: "Instrumental in passing Kenya's 2010 Constitution.",
    },
    Milestone {
        year: "2013",
        title: "Presidential Run",
        description: "Ran for president and continued as opposition leader.",
    },
    Milestone {
        year: "2017",
        title: "Presidential Run & Election Dispute",
        description: "The Supreme Court annulled the result; he later lost the re-run.",
    },
    Milestone {
        year: "2022",
        title: "Elder Statesman",
        description: "Advocated for good governance, youth empowerment and Pan-African leadership.",
    },
];

const PAGE_HEAD: &str = "<!doctype html><html lang=\"en\"><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">";

pub async fn home() -> Html<String> {
    Html(render_home())
}

/// Read-only rendering of the board for visitors without a live client.
pub async fn tributes(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let tributes = state.repository.list().await?;
    Ok(Html(render_tributes(&tributes)))
}

pub async fn admin() -> Html<String> {
    let mut page = String::from(PAGE_HEAD);
    page.push_str("<title>Admin</title></head><body><main><h1>Admin Dashboard</h1>");
    page.push_str(
        "<p>Sign in with <code>POST /api/admin/login</code>, then manage entries through \
<code>/api/admin/tributes</code>.</p><p><a href=\"/\">Home</a></p></main></body></html>",
    );
    Html(page)
}

fn render_home() -> String {
    let mut page = String::from(PAGE_HEAD);
    page.push_str("<title>Raila Amollo Odinga</title></head><body><main>");
    page.push_str("<section class=\"hero\"><h1>Raila Amollo Odinga</h1>");
    page.push_str(
        "<p>A man of resilience, courage, and undying love for Kenya.</p>\
<nav><a href=\"/tributes\">View Tributes</a> <a href=\"/admin\">Admin Dashboard</a></nav></section>",
    );
    page.push_str("<section class=\"timeline\"><ol>");
    for milestone in TIMELINE {
        let _ = write!(
            page,
            "<li><h2>{} &middot; {}</h2><p>{}</p></li>",
            escape(milestone.year),
            escape(milestone.title),
            escape(milestone.description)
        );
    }
    page.push_str("</ol></section></main></body></html>");
    page
}

fn render_tributes(tributes: &[tb_core::Tribute]) -> String {
    let mut page = String::from(PAGE_HEAD);
    page.push_str("<title>Tributes</title></head><body><main><h1>Tributes</h1>");
    if tributes.is_empty() {
        page.push_str("<p>No tributes yet.</p>");
    }
    page.push_str("<ul class=\"tributes\">");
    for tribute in tributes {
        page.push_str("<li>");
        if let Some(url) = &tribute.photo_url {
            let _ = write!(page, "<img src=\"{}\" alt=\"\">", escape(url));
        }
        let _ = write!(
            page,
            "<h2>{}</h2><p>{}</p><time datetime=\"{}\">{}</time></li>",
            escape(&tribute.name),
            escape(&tribute.message),
            tribute.date.to_rfc3339(),
            tribute.date.format("%Y-%m-%d %H:%M UTC")
        );
    }
    page.push_str("</ul><p><a href=\"/\">Home</a></p></main></body></html>");
    page
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
