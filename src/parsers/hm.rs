//! H&M order-confirmation layout parser.
//!
//! H&M mails arrive quoted-printable encoded and lay out articles as
//! `tr.pl-articles-table-row` rows: styled font elements for name and
//! price, an image hosted under `assets.hm.com/articles/`, and a details
//! table keyed by `Art. No.` / `Color` / `Size` / `Quantity`.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use crate::mailbox::{decode_quoted_printable, looks_quoted_printable};
use crate::parsers::element_text;
use crate::pipeline::types::RawProduct;

static ROW: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr.pl-articles-table-row").expect("selector"));
static NAME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"font[style*="color:#222222"][style*="text-decoration:none"]"#)
        .expect("selector")
});
static PRICE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"font[style*="color: #CE2129"]"#).expect("selector"));
static IMG: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"img[src*="assets.hm.com/articles/"]"#).expect("selector"));
static DETAILS_TABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("selector"));
static TR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").expect("selector"));
static TD: LazyLock<Selector> = LazyLock::new(|| Selector::parse("td").expect("selector"));

pub fn parse(html: &str) -> Vec<RawProduct> {
    let decoded;
    let html = if looks_quoted_printable(html) {
        decoded = decode_quoted_printable(html);
        &decoded
    } else {
        html
    };

    let document = Html::parse_document(html);
    let mut products = Vec::new();

    for row in document.select(&ROW) {
        let name = row
            .select(&NAME)
            .next()
            .map(element_text)
            .unwrap_or_default();
        if name.is_empty() {
            continue;
        }

        let price = row
            .select(&PRICE)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let image_url = row
            .select(&IMG)
            .next()
            .and_then(|img| img.value().attr("src"))
            .unwrap_or_default()
            .to_string();

        let details = read_details(row);

        products.push(RawProduct {
            brand: "H&M".into(),
            name,
            color: details.color,
            size: details.size,
            price,
            quantity: details.quantity,
            image_url,
            ..Default::default()
        });
    }

    products
}

#[derive(Default)]
struct Details {
    color: String,
    size: String,
    quantity: u32,
}

/// Label/value pairs from the article details table.
fn read_details(row: ElementRef<'_>) -> Details {
    let mut details = Details {
        quantity: 1,
        ..Default::default()
    };

    for table in row.select(&DETAILS_TABLE) {
        for tr in table.select(&TR) {
            let cells: Vec<ElementRef<'_>> = tr.select(&TD).collect();
            if cells.len() < 2 {
                continue;
            }
            let label = element_text(cells[0]).to_lowercase();
            let value = element_text(cells[1]);
            if value.is_empty() {
                continue;
            }
            if label.contains("color") {
                details.color = value;
            } else if label.contains("size") {
                details.size = value;
            } else if label.contains("quantity") {
                details.quantity = value.parse().unwrap_or(1);
            }
        }
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_html() -> &'static str {
        r#"<html><body><table>
        <tr class="pl-articles-table-row">
          <td><img src="https://assets.hm.com/articles/12345_main.jpg"></td>
          <td>
            <font style="color:#222222; text-decoration:none;">Regular Fit Crew-neck T-shirt</font>
            <font style="color: #CE2129">Rs.799.00</font>
            <table>
              <tr><td>Art. No.</td><td>0685816001</td></tr>
              <tr><td>Color</td><td>White</td></tr>
              <tr><td>Size</td><td>M</td></tr>
              <tr><td>Quantity</td><td>2</td></tr>
            </table>
          </td>
        </tr>
        </table></body></html>"#
    }

    #[test]
    fn extracts_article_with_details_table() {
        let products = parse(order_html());
        assert_eq!(products.len(), 1);

        let p = &products[0];
        assert_eq!(p.brand, "H&M");
        assert_eq!(p.name, "Regular Fit Crew-neck T-shirt");
        assert_eq!(p.price, "Rs.799.00");
        assert_eq!(p.color, "White");
        assert_eq!(p.size, "M");
        assert_eq!(p.quantity, 2);
        assert!(p.image_url.contains("assets.hm.com/articles/"));
    }

    #[test]
    fn quoted_printable_body_is_decoded_before_parsing() {
        let encoded = order_html().replace("style=\"", "style=3D\"");
        assert!(looks_quoted_printable(&encoded));
        let products = parse(&encoded);
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].name, "Regular Fit Crew-neck T-shirt");
    }

    #[test]
    fn rows_without_name_are_skipped() {
        let html = r#"<tr class="pl-articles-table-row"><td>no fonts</td></tr>"#;
        assert!(parse(html).is_empty());
    }
}
