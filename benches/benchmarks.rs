use criterion::{criterion_group, criterion_main, Criterion};
use page_mirror::{derive_filename, Document, NodeMatcher, RuleSet, UrlResolver};
use std::hint::black_box;
use url::Url;

const PAGE: &str = r#"
    <html>
        <head>
            <link rel="stylesheet" href="/style.css">
            <script src="/script.js"></script>
            <link rel="stylesheet" href="/theme.css" integrity="sha384-abc" crossorigin="anonymous">
            <script src="//cdn.example.com/utils.js"></script>
            <link rel="shortcut icon" href="favicon.ico">
        </head>
        <body>
            <img src="/logo.png" alt="Logo">
            <img src="banner.jpg" alt="Banner">
            <img data-src="lazy.webp">
            <a href="/about">About</a>
            <a href="/contact">Contact</a>
        </body>
    </html>
"#;

fn bench_filename_derivation(c: &mut Criterion) {
    let long = format!("https://example.com/track?{}", "abcdefghij".repeat(60));
    let test_urls = vec![
        "https://example.com/style.css",
        "https://example.com/path with spaces/img.png",
        "https://fonts.googleapis.com/css?family=Roboto:400,700|Open+Sans",
        "https://example.com/__weird__..name--.js?x=1&&y=2",
        long.as_str(),
    ];

    c.bench_function("derive_filenames", |b| {
        b.iter(|| {
            for url in &test_urls {
                let _name = derive_filename(black_box(url), Some("js"));
            }
        });
    });
}

fn bench_url_resolution(c: &mut Criterion) {
    let resolver = UrlResolver::new(Url::parse("https://example.com/subdir/page.html").unwrap());
    let test_urls = vec![
        "../style.css",
        "./script.js",
        "images/photo.jpg",
        "/assets/logo.png",
        "https://cdn.example.com/style.css",
        "//cdn.example.com/script.js",
    ];

    c.bench_function("resolve_urls", |b| {
        b.iter(|| {
            for url in &test_urls {
                let _resolved = resolver.resolve(black_box(url));
            }
        });
    });
}

fn bench_rule_matching(c: &mut Criterion) {
    let rules = RuleSet::builtin();

    c.bench_function("select_builtin_rules", |b| {
        b.iter(|| {
            let document = Document::parse(black_box(PAGE));
            for rule in rules.iter() {
                let _nodes = document.select(&rule.matcher);
            }
        });
    });
}

fn bench_rewrite_and_serialize(c: &mut Criterion) {
    let images: NodeMatcher = "img[src]".parse().unwrap();

    c.bench_function("rewrite_and_serialize", |b| {
        b.iter(|| {
            let document = Document::parse(black_box(PAGE));
            for element in document.select(&images) {
                element.remove_attr("crossorigin");
                element.set_attr("src", "res/local.png");
            }
            let _html = document.to_html().unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_filename_derivation,
    bench_url_resolution,
    bench_rule_matching,
    bench_rewrite_and_serialize,
);
criterion_main!(benches);
