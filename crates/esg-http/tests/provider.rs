use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;

use esg_http::{Locator, Page, ProviderConfig, ProviderDriver, QuerySource};
use esg_scheduler::{CompanyRecord, Identity, ScrapeError, SiteDriver};

const RATING_PAGE: &str = r#"<html>
<head><title>ESG Ratings</title></head>
<body>
  <div id="company-name">Apple Inc.</div>
  <div class="esg-rating">
    <span class="rating-value">  BBB </span>
    <a class="report" href="/reports/aapl.pdf">Report</a>
  </div>
  <table><tr><td data-field="controversy">Moderate</td></tr></table>
</body>
</html>"#;

const YAML: &str = r#"
name: msci
searchUrl: "http://127.0.0.1:{port}/search?q={query}"
cleanQuery: true
fields:
  - name: company
    locator:
      byId: company-name
  - name: rating
    locator:
      byClass: rating-value
  - name: report
    locator:
      byCssSelector: "div.esg-rating a.report"
    attr: href
  - name: outlook
    locator:
      byClass: outlook
    optional: true
"#;

fn config(port: u16) -> ProviderConfig {
    serde_yaml::from_str(&YAML.replace("{port}", &port.to_string())).unwrap()
}

/// Serves `responses` to successive connections and returns the request lines.
fn serve(responses: Vec<(u16, &'static str)>) -> (u16, thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let mut requests = vec![];
        for (status, body) in responses {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut header = String::new();
            while reader.read_line(&mut header).unwrap() > 2 {
                header.clear();
            }
            requests.push(request_line.trim_end().to_string());
            write!(
                stream,
                "HTTP/1.1 {status} X\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
        }
        requests
    });
    (port, handle)
}

#[test]
fn yaml_config_defaults() {
    let config = config(80);

    assert_eq!("msci", config.name);
    assert_eq!(QuerySource::Name, config.query);
    assert_eq!(30, config.timeout_secs);
    assert_eq!(4, config.fields.len());
    assert_eq!(Locator::ById("company-name".into()), config.fields[0].locator);
    assert_eq!(Some("href"), config.fields[2].attr.as_deref());
    assert!(config.fields[3].optional);
}

#[test]
fn locators_on_static_page() {
    let page = Page::parse(RATING_PAGE);
    let extract = |locator: Locator, attr: Option<&str>| locator.compile().unwrap().extract(&page, attr);

    assert_eq!(Ok(String::from("Apple Inc.")), extract(Locator::ById("company-name".into()), None));
    assert_eq!(Ok(String::from("BBB")), extract(Locator::ByClass("rating-value".into()), None));
    assert_eq!(
        Ok(String::from("/reports/aapl.pdf")),
        extract(Locator::ByCssSelector("a.report".into()), Some("href"))
    );
    assert_eq!(
        Ok(String::from("Moderate")),
        extract(Locator::ByCssSelector("td[data-field=controversy]".into()), None)
    );
    assert!(matches!(
        extract(Locator::ById("missing".into()), None),
        Err(ScrapeError::ElementNotFound(_))
    ));
    assert!(matches!(
        extract(Locator::ByClass("report".into()), Some("title")),
        Err(ScrapeError::ElementNotFound(_))
    ));
}

#[test]
fn xpath_locator() {
    let page = Page::parse(RATING_PAGE);
    let by_path = |xpath: &str| Locator::ByPath(xpath.into()).compile().unwrap().extract(&page, None);

    assert_eq!(Ok(String::from("Apple Inc.")), by_path("//div[@id='company-name']"));
    assert_eq!(Ok(String::from("/reports/aapl.pdf")), by_path("//a[@class='report']/@href"));
    assert_eq!(Ok(String::from("1")), by_path("count(//table)"));
    assert!(matches!(by_path("//section"), Err(ScrapeError::ElementNotFound(_))));

    let broken = Page::parse("<html><body><p>unclosed</body></html>");
    assert!(matches!(
        Locator::ByPath("//p".into()).compile().unwrap().extract(&broken, None),
        Err(ScrapeError::Parse(_))
    ));
}

#[test]
fn xpath_locator_reused_across_pages() {
    let locator = Locator::ByPath("//span[@class='rating-value']".into()).compile().unwrap();
    let other = RATING_PAGE.replace("BBB", "AAA");

    for (source, rating) in [(RATING_PAGE, "BBB"), (other.as_str(), "AAA"), (RATING_PAGE, "BBB")] {
        assert_eq!(Ok(String::from(rating)), locator.extract(&Page::parse(source), None));
    }

    let worker = thread::spawn(move || locator.extract(&Page::parse(RATING_PAGE), None));
    assert_eq!(Ok(String::from("BBB")), worker.join().unwrap());
}

#[test]
fn invalid_locators_rejected_at_construction() {
    assert!(Locator::ByCssSelector("div[".into()).compile().is_err());
    assert!(Locator::ByPath("//div[".into()).compile().is_err());

    let mut config = config(80);
    config.fields[1].locator = Locator::ByCssSelector(">>".into());
    let err = ProviderDriver::new(config).err().unwrap();
    assert!(format!("{err:#}").contains("field rating"));
}

#[test]
fn search_url_requires_placeholder() {
    let mut config = config(80);
    config.search_url = "http://127.0.0.1/search".into();

    assert!(ProviderDriver::new(config).is_err());
}

#[test]
fn search_url_encodes_query() {
    let driver = ProviderDriver::new(config(80)).unwrap();
    let company = CompanyRecord::new("KO", "The Coca-Cola Company");
    assert_eq!("http://127.0.0.1:80/search?q=coca-cola%20co", driver.search_url(&company));

    let mut config = config(80);
    config.query = QuerySource::Key;
    config.clean_query = false;
    let driver = ProviderDriver::new(config).unwrap();
    assert_eq!("http://127.0.0.1:80/search?q=KO", driver.search_url(&company));
}

#[test]
fn scrape_over_http() {
    let (port, server) = serve(vec![(200, RATING_PAGE)]);
    let driver = ProviderDriver::new(config(port)).unwrap();
    let mut session = driver.open_session(&Identity::new("test-agent/1.0")).unwrap();

    let fields = driver
        .scrape(&CompanyRecord::new("AAPL", "Apple Inc."), &mut session)
        .unwrap();

    assert_eq!(
        vec![
            ("company", "Apple Inc."),
            ("rating", "BBB"),
            ("report", "/reports/aapl.pdf"),
        ],
        fields.iter().collect::<Vec<_>>()
    );
    assert_eq!(vec!["GET /search?q=apple%20inc HTTP/1.1"], server.join().unwrap());
}

#[test]
fn http_errors_map_to_scrape_errors() {
    let (port, server) = serve(vec![
        (403, "denied"),
        (429, "slow down"),
        (500, "oops"),
        (200, "<html><body>No results</body></html>"),
    ]);
    let driver = ProviderDriver::new(config(port)).unwrap();
    let mut session = driver.open_session(&Identity::new("test-agent/1.0")).unwrap();
    let company = CompanyRecord::new("AAPL", "Apple Inc.");

    let mut scrape = || {
        driver
            .scrape(&company, &mut session)
            .unwrap_err()
            .downcast::<ScrapeError>()
            .unwrap()
    };

    assert_eq!(ScrapeError::Blocked(403), scrape());
    assert_eq!(ScrapeError::Blocked(429), scrape());
    assert!(matches!(scrape(), ScrapeError::Network(_)));
    assert!(matches!(scrape(), ScrapeError::ElementNotFound(_)));
    server.join().unwrap();
}

#[test]
fn unreachable_site_is_a_network_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let driver = ProviderDriver::new(config(port)).unwrap();
    let mut session = driver.open_session(&Identity::new("test-agent/1.0")).unwrap();

    let err = driver
        .scrape(&CompanyRecord::new("AAPL", "Apple Inc."), &mut session)
        .unwrap_err();

    assert!(matches!(err.downcast_ref::<ScrapeError>(), Some(ScrapeError::Network(_))));
}
