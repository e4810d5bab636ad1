//! Google Sheets v4 REST client implementing [`SheetStore`].

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::auth::TokenSource;
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::retry::{api_error, RetryPolicy};
use crate::sheet::SheetStore;
use crate::types::{Column, Status, LAST_COLUMN};

const SERVICE: &str = "sheets";

/// Rows covered by the status dropdown and colour rules.
const FORMATTED_ROWS: u32 = 1000;

/// Background colour per status (r, g, b).
const STATUS_COLOURS: [(Status, (f32, f32, f32)); 4] = [
    (Status::Pending, (1.0, 0.8, 0.4)),
    (Status::Processing, (0.4, 0.7, 1.0)),
    (Status::Completed, (0.6, 0.9, 0.6)),
    (Status::Failed, (1.0, 0.6, 0.6)),
];

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

pub struct SheetsClient {
    http: Client,
    api_base: String,
    spreadsheet_id: String,
    worksheet: String,
    tokens: Arc<TokenSource>,
    retry: RetryPolicy,
    write_interval: Duration,
    last_write: Mutex<Option<Instant>>,
}

impl SheetsClient {
    pub fn new(cfg: &Config, tokens: Arc<TokenSource>) -> Result<Self> {
        if cfg.sheets.spreadsheet_id.trim().is_empty() {
            return Err(PipelineError::MissingConfig("sheets.spreadsheet_id".into()));
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| transport(&e))?;
        Ok(Self {
            http,
            api_base: cfg.sheets.api_base.trim_end_matches('/').to_string(),
            spreadsheet_id: cfg.sheets.spreadsheet_id.clone(),
            worksheet: cfg.sheets.worksheet.clone(),
            tokens,
            retry: cfg.retry.policy(),
            write_interval: Duration::from_millis(cfg.sheets.write_interval_ms),
            last_write: Mutex::new(None),
        })
    }

    fn spreadsheet_url(&self, suffix: &str) -> Result<Url> {
        let raw = format!("{}/spreadsheets/{}{}", self.api_base, self.spreadsheet_id, suffix);
        Url::parse(&raw).map_err(|e| PipelineError::InvalidConfig(format!("bad sheets URL '{raw}': {e}")))
    }

    fn values_url(&self, range: &str) -> Result<Url> {
        let mut url = self.spreadsheet_url("/values")?;
        url.path_segments_mut()
            .map_err(|_| PipelineError::InvalidConfig("sheets.api_base cannot be a base URL".into()))?
            .push(range);
        Ok(url)
    }

    fn range(&self, start_row: usize, end_row: usize) -> String {
        format!("{}!A{start_row}:{LAST_COLUMN}{end_row}", self.worksheet)
    }

    /// Space write calls at least `write_interval` apart.
    fn throttle(&self) {
        let Ok(mut last) = self.last_write.lock() else {
            return;
        };
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.write_interval {
                std::thread::sleep(self.write_interval - elapsed);
            }
        }
        *last = Some(Instant::now());
    }

    fn send<F>(&self, what: &str, build: F) -> Result<Value>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.retry.run(what, |_| {
            let token = self.tokens.token()?;
            let resp = build(&self.http)
                .bearer_auth(&token)
                .send()
                .map_err(|e| transport(&e))?;
            let status = resp.status();
            let body = resp.text().map_err(|e| transport(&e))?;
            if !status.is_success() {
                return Err(api_error(SERVICE, status.as_u16(), &body));
            }
            if body.trim().is_empty() {
                return Ok(Value::Null);
            }
            Ok(serde_json::from_str(&body)?)
        })
    }

    fn put_values(&self, range: &str, rows: &[Vec<String>]) -> Result<()> {
        let mut url = self.values_url(range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": rows,
        });
        self.throttle();
        self.send(&format!("write {range}"), |c| c.put(url.clone()).json(&body))?;
        tracing::debug!("wrote {} row(s) to {range}", rows.len());
        Ok(())
    }

    fn first_sheet_id(&self) -> Result<i64> {
        let mut url = self.spreadsheet_url("")?;
        url.query_pairs_mut().append_pair("fields", "sheets.properties");
        let meta = self.send("read spreadsheet metadata", |c| c.get(url.clone()))?;
        let sheets = meta["sheets"].as_array().cloned().unwrap_or_default();
        let matching = sheets
            .iter()
            .find(|s| s["properties"]["title"].as_str() == Some(self.worksheet.as_str()))
            .or_else(|| sheets.first());
        matching
            .and_then(|s| s["properties"]["sheetId"].as_i64())
            .ok_or_else(|| api_error(SERVICE, 404, "spreadsheet has no worksheets"))
    }
}

/// Batch-update requests for the status dropdown and colour rules.
pub fn status_formatting_requests(sheet_id: i64) -> Vec<Value> {
    let status_col = Column::Status.index();
    let range = json!({
        "sheetId": sheet_id,
        "startRowIndex": 1,
        "endRowIndex": FORMATTED_ROWS,
        "startColumnIndex": status_col,
        "endColumnIndex": status_col + 1,
    });

    let mut requests = vec![json!({
        "setDataValidation": {
            "range": range,
            "rule": {
                "condition": {
                    "type": "ONE_OF_LIST",
                    "values": Status::all()
                        .iter()
                        .map(|s| json!({ "userEnteredValue": s.as_str() }))
                        .collect::<Vec<_>>(),
                },
                "showCustomUi": true,
                "strict": true,
            }
        }
    })];

    for (index, (status, (r, g, b))) in STATUS_COLOURS.iter().enumerate() {
        requests.push(json!({
            "addConditionalFormatRule": {
                "rule": {
                    "ranges": [range],
                    "booleanRule": {
                        "condition": {
                            "type": "TEXT_EQ",
                            "values": [{ "userEnteredValue": status.as_str() }],
                        },
                        "format": {
                            "backgroundColor": { "red": r, "green": g, "blue": b },
                            "textFormat": { "bold": true },
                        }
                    }
                },
                "index": index,
            }
        }));
    }
    requests
}

fn transport(e: &reqwest::Error) -> PipelineError {
    PipelineError::Transport {
        service: SERVICE,
        message: e.to_string(),
    }
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl SheetStore for SheetsClient {
    fn read_all(&self) -> Result<Vec<Vec<String>>> {
        let range = format!("{}!A:{LAST_COLUMN}", self.worksheet);
        let url = self.values_url(&range)?;
        let value = self.send("read sheet", |c| c.get(url.clone()))?;
        let parsed: ValueRange = serde_json::from_value(value)?;
        Ok(parsed
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    fn write_range(&self, start_row: usize, rows: &[Vec<String>]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        if start_row == 0 {
            return Err(PipelineError::RowOutOfRange(0));
        }
        let range = self.range(start_row, start_row + rows.len() - 1);
        self.put_values(&range, rows)
    }

    fn update_cell(&self, row: usize, col: Column, value: &str) -> Result<()> {
        if row == 0 {
            return Err(PipelineError::RowOutOfRange(0));
        }
        let range = format!("{}!{}{row}", self.worksheet, col.letter());
        self.put_values(&range, &[vec![value.to_string()]])
    }

    fn setup_status_formatting(&self) -> Result<()> {
        let sheet_id = self.first_sheet_id()?;
        let url = self.spreadsheet_url(":batchUpdate")?;
        let body = json!({ "requests": status_formatting_requests(sheet_id) });
        self.throttle();
        self.send("install status formatting", |c| c.post(url.clone()).json(&body))?;
        tracing::info!("status dropdown and colours installed");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::ApiErrorKind;
    use mockito::Matcher;

    fn client(server: &mockito::Server, attempts: u32) -> SheetsClient {
        let mut cfg = Config::template();
        cfg.sheets.spreadsheet_id = "sid".into();
        cfg.sheets.api_base = server.url();
        cfg.sheets.write_interval_ms = 0;
        cfg.retry.max_attempts = attempts;
        cfg.retry.base_delay_ms = 0;
        cfg.retry.max_delay_ms = 0;
        SheetsClient::new(&cfg, Arc::new(TokenSource::Static("tok".into()))).unwrap()
    }

    #[test]
    fn requires_spreadsheet_id() {
        let cfg = Config::template();
        let err = SheetsClient::new(&cfg, Arc::new(TokenSource::Static("t".into()))).err().unwrap();
        assert!(matches!(err, PipelineError::MissingConfig(_)));
    }

    #[test]
    fn read_all_parses_values() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", Matcher::Regex(r"^/spreadsheets/sid/values/Sheet1".into()))
            .match_header("authorization", "Bearer tok")
            .with_status(200)
            .with_body(r#"{"range":"Sheet1!A1:H3","values":[["Date","Username"],["01-JAN-25","@a","link",7]]}"#)
            .create();

        let rows = client(&server, 1).read_all().unwrap();
        m.assert();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], "@a");
        assert_eq!(rows[1][3], "7");
    }

    #[test]
    fn empty_sheet_has_no_values_key() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", Matcher::Regex(r"^/spreadsheets/sid/values/".into()))
            .with_status(200)
            .with_body(r#"{"range":"Sheet1!A1:H1000","majorDimension":"ROWS"}"#)
            .create();
        assert!(client(&server, 1).read_all().unwrap().is_empty());
    }

    #[test]
    fn write_range_puts_rows() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("PUT", Matcher::Regex(r"^/spreadsheets/sid/values/Sheet1!A5:H6".into()))
            .match_query(Matcher::UrlEncoded("valueInputOption".into(), "RAW".into()))
            .match_body(Matcher::PartialJson(json!({
                "values": [["a"], ["b"]]
            })))
            .with_status(200)
            .with_body("{}")
            .create();

        client(&server, 1)
            .write_range(5, &[vec!["a".into()], vec!["b".into()]])
            .unwrap();
        m.assert();
    }

    #[test]
    fn quota_errors_are_retried_until_budget_spent() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("PUT", Matcher::Regex(r"^/spreadsheets/sid/values/".into()))
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body(r#"{"error":{"message":"Quota exceeded"}}"#)
            .expect(3)
            .create();

        let err = client(&server, 3)
            .update_cell(2, Column::Status, "processing")
            .unwrap_err();
        m.assert();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Quota));
    }

    #[test]
    fn permission_errors_are_not_retried() {
        let mut server = mockito::Server::new();
        let m = server
            .mock("GET", Matcher::Regex(r"^/spreadsheets/sid/values/".into()))
            .with_status(403)
            .with_body(r#"{"error":{"message":"The caller does not have permission"}}"#)
            .expect(1)
            .create();

        let err = client(&server, 5).read_all().unwrap_err();
        m.assert();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Permission));
        assert!(err.hint().unwrap().contains("share"));
    }

    #[test]
    fn formatting_targets_named_worksheet() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/spreadsheets/sid")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"sheets":[{"properties":{"sheetId":11,"title":"Other"}},{"properties":{"sheetId":42,"title":"Sheet1"}}]}"#)
            .create();
        let update = server
            .mock("POST", "/spreadsheets/sid:batchUpdate")
            .match_body(Matcher::Regex(r#""sheetId":42"#.into()))
            .with_status(200)
            .with_body("{}")
            .create();

        client(&server, 1).setup_status_formatting().unwrap();
        update.assert();
    }

    #[test]
    fn formatting_requests_cover_every_status() {
        let reqs = status_formatting_requests(0);
        assert_eq!(reqs.len(), 1 + Status::all().len());
        let values = &reqs[0]["setDataValidation"]["rule"]["condition"]["values"];
        assert_eq!(values.as_array().unwrap().len(), 4);
        assert_eq!(reqs[0]["setDataValidation"]["range"]["startColumnIndex"], 5);
    }
}
