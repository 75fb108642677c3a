#[path = "../../src/document/fixtures.rs"]
mod fixtures;

pub use fixtures::pdf_with_pages;
