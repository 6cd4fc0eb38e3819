//! Proforma PDF rendering.
//!
//! A4 portrait, builtin Helvetica. Coordinates are millimetres from the
//! bottom-left corner, as printpdf expects.

use printpdf::{
    BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference, Point,
};
use rust_decimal::Decimal;

use super::document::ProformaDocument;
use super::error::BillingError;
use super::format::{format_date, format_money};

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN_LEFT: f32 = 15.0;
const MARGIN_RIGHT: f32 = 195.0;
const TOP: f32 = 282.0;
const BOTTOM: f32 = 20.0;

const COL_CONCEPT: f32 = 15.0;
const COL_QUANTITY: f32 = 118.0;
const COL_UNIT_PRICE: f32 = 140.0;
const COL_LINE_TOTAL: f32 = 170.0;
const CONCEPT_WRAP: usize = 55;

struct Canvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
}

impl Canvas {
    fn new(title: &str) -> Result<Self, BillingError> {
        let (doc, page, layer) =
            PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(render_error)?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(render_error)?;

        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: TOP,
        })
    }

    fn text(&self, text: &str, size: f32, x: f32) {
        self.layer.use_text(text, size, Mm(x), Mm(self.y), &self.regular);
    }

    fn bold(&self, text: &str, size: f32, x: f32) {
        self.layer.use_text(text, size, Mm(x), Mm(self.y), &self.bold);
    }

    fn rule(&self) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN_LEFT), Mm(self.y)), false),
                (Point::new(Mm(MARGIN_RIGHT), Mm(self.y)), false),
            ],
            is_closed: false,
        });
    }

    fn frame(&self, top: f32, bottom: f32) {
        self.layer.add_line(Line {
            points: vec![
                (Point::new(Mm(MARGIN_LEFT - 2.0), Mm(top)), false),
                (Point::new(Mm(MARGIN_RIGHT), Mm(top)), false),
                (Point::new(Mm(MARGIN_RIGHT), Mm(bottom)), false),
                (Point::new(Mm(MARGIN_LEFT - 2.0), Mm(bottom)), false),
            ],
            is_closed: true,
        });
    }

    fn down(&mut self, mm: f32) {
        self.y -= mm;
    }

    /// Start a new page when fewer than `needed` mm remain.
    fn ensure_space(&mut self, needed: f32) {
        if self.y - needed >= BOTTOM {
            return;
        }
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = TOP;
    }

    fn finish(self) -> Result<Vec<u8>, BillingError> {
        let mut writer = std::io::BufWriter::new(Vec::<u8>::new());
        self.doc.save(&mut writer).map_err(render_error)?;
        writer.into_inner().map_err(render_error)
    }
}

fn render_error(err: impl std::fmt::Display) -> BillingError {
    BillingError::Render {
        message: err.to_string(),
    }
}

/// Render a proforma to PDF bytes.
pub fn render_proforma(doc: &ProformaDocument) -> Result<Vec<u8>, BillingError> {
    let mut canvas = Canvas::new(&format!("Proforma {}", doc.number))?;

    header(&mut canvas, doc);
    info_block(&mut canvas, doc);
    items_table(&mut canvas, doc);
    totals_block(&mut canvas, doc);
    notes_panel(&mut canvas, doc);
    bank_panel(&mut canvas, doc);

    canvas.finish()
}

fn header(canvas: &mut Canvas, doc: &ProformaDocument) {
    canvas.bold(&doc.provider.name, 16.0, MARGIN_LEFT);
    canvas.bold("PROFORMA", 22.0, 145.0);
    canvas.down(7.0);

    if let Some(tax_id) = &doc.provider.tax_id {
        canvas.text(&format!("RNC: {}", tax_id), 9.0, MARGIN_LEFT);
        canvas.down(4.5);
    }
    if let Some(address) = &doc.provider.address {
        canvas.text(address, 9.0, MARGIN_LEFT);
        canvas.down(4.5);
    }
    if let Some(phone) = &doc.provider.phone {
        canvas.text(&format!("Tel: {}", phone), 9.0, MARGIN_LEFT);
        canvas.down(4.5);
    }

    canvas.down(3.0);
    canvas.rule();
    canvas.down(9.0);
}

fn info_block(canvas: &mut Canvas, doc: &ProformaDocument) {
    canvas.bold("Bill to:", 11.0, MARGIN_LEFT);
    canvas.bold("Proforma No.:", 10.0, 120.0);
    canvas.text(&doc.number, 10.0, 148.0);
    canvas.down(6.0);

    canvas.text(&doc.client.name, 10.0, MARGIN_LEFT);
    canvas.bold("Issue date:", 10.0, 120.0);
    canvas.text(&format_date(doc.issue_date), 10.0, 148.0);
    canvas.down(5.0);

    if let Some(tax_id) = &doc.client.tax_id {
        canvas.text(&format!("RNC: {}", tax_id), 10.0, MARGIN_LEFT);
    }
    canvas.bold("Valid until:", 10.0, 120.0);
    canvas.text(&format_date(doc.expiration_date), 10.0, 148.0);
    canvas.down(5.0);

    if let Some(address) = &doc.client.address {
        canvas.text(address, 10.0, MARGIN_LEFT);
    }
    canvas.bold("Currency:", 10.0, 120.0);
    canvas.text(&doc.currency, 10.0, 148.0);
    canvas.down(5.0);

    if let Some(contact) = &doc.client.contact_name {
        canvas.text(&format!("Attn: {}", contact), 10.0, MARGIN_LEFT);
        canvas.down(5.0);
    }

    canvas.down(6.0);
}

fn table_header(canvas: &mut Canvas) {
    canvas.bold("Concept", 10.0, COL_CONCEPT);
    canvas.bold("Qty", 10.0, COL_QUANTITY);
    canvas.bold("Unit price", 10.0, COL_UNIT_PRICE);
    canvas.bold("Total", 10.0, COL_LINE_TOTAL);
    canvas.down(3.0);
    canvas.rule();
    canvas.down(6.0);
}

fn items_table(canvas: &mut Canvas, doc: &ProformaDocument) {
    canvas.ensure_space(20.0);
    table_header(canvas);

    for line in &doc.lines {
        let concept = if line.code.is_empty() {
            line.description.clone()
        } else {
            format!("{} - {}", line.code, line.description)
        };
        let wrapped = wrap(&concept, CONCEPT_WRAP);
        let height = 5.0 * wrapped.len() as f32 + 1.5;

        if canvas.y - height < BOTTOM {
            canvas.ensure_space(height + 20.0);
            table_header(canvas);
        }

        canvas.text(&format_quantity(line.quantity), 10.0, COL_QUANTITY);
        canvas.text(&format_money(line.unit_price), 10.0, COL_UNIT_PRICE);
        canvas.text(&format_money(line.line_total), 10.0, COL_LINE_TOTAL);
        for (i, part) in wrapped.iter().enumerate() {
            if i > 0 {
                canvas.down(5.0);
            }
            canvas.text(part, 10.0, COL_CONCEPT);
        }
        canvas.down(6.5);
    }

    canvas.down(-2.0);
    canvas.rule();
    canvas.down(8.0);
}

fn totals_block(canvas: &mut Canvas, doc: &ProformaDocument) {
    canvas.ensure_space(40.0);
    let totals = &doc.totals;
    let label_x = 135.0;

    canvas.text("Subtotal:", 10.0, label_x);
    canvas.text(&format_money(totals.subtotal), 10.0, COL_LINE_TOTAL);
    canvas.down(5.5);

    if !totals.discount.is_zero() {
        canvas.text("Discount:", 10.0, label_x);
        canvas.text(&format!("-{}", format_money(totals.discount)), 10.0, COL_LINE_TOTAL);
        canvas.down(5.5);
        canvas.text("Net:", 10.0, label_x);
        canvas.text(
            &format_money(totals.subtotal - totals.discount),
            10.0,
            COL_LINE_TOTAL,
        );
        canvas.down(5.5);
    }

    canvas.text("Tax:", 10.0, label_x);
    canvas.text(&format_money(totals.tax), 10.0, COL_LINE_TOTAL);
    canvas.down(7.0);

    canvas.bold("TOTAL:", 12.0, label_x);
    canvas.bold(
        &format!("{} {}", doc.currency, format_money(totals.total)),
        12.0,
        160.0,
    );
    canvas.down(6.0);

    if let Some(rate) = doc.exchange_rate {
        canvas.text(&format!("Exchange rate: {}", rate.normalize()), 9.0, label_x);
        canvas.down(5.0);
    }

    canvas.down(6.0);
}

fn notes_panel(canvas: &mut Canvas, doc: &ProformaDocument) {
    let Some(notes) = doc.notes.as_deref().filter(|n| !n.trim().is_empty()) else {
        return;
    };

    let lines: Vec<String> = notes.lines().flat_map(|l| wrap(l, 95)).collect();
    let height = 8.0 + 4.5 * lines.len() as f32;
    canvas.ensure_space(height + 4.0);

    let top = canvas.y + 5.0;
    canvas.bold("Notes", 10.0, MARGIN_LEFT);
    canvas.down(5.5);
    for line in &lines {
        canvas.text(line, 9.0, MARGIN_LEFT);
        canvas.down(4.5);
    }
    canvas.frame(top, canvas.y + 2.0);
    canvas.down(8.0);
}

fn bank_panel(canvas: &mut Canvas, doc: &ProformaDocument) {
    let Some(bank) = &doc.bank_transfer else {
        return;
    };

    let rows = bank.rows();
    let height = 20.0 + 5.0 * rows.len() as f32;
    canvas.ensure_space(height + 4.0);

    let top = canvas.y + 5.0;
    canvas.bold("Bank transfer", 10.0, MARGIN_LEFT);
    canvas.down(5.5);
    canvas.text(&format!("Beneficiary: {}", bank.beneficiary), 9.0, MARGIN_LEFT);
    canvas.down(4.5);
    if let Some(tax_id) = &bank.tax_id {
        canvas.text(&format!("RNC: {}", tax_id), 9.0, MARGIN_LEFT);
        canvas.down(4.5);
    }

    if !rows.is_empty() {
        canvas.down(1.0);
        canvas.bold("Bank", 9.0, MARGIN_LEFT);
        canvas.bold("Currency", 9.0, 80.0);
        canvas.bold("Account", 9.0, 105.0);
        canvas.bold("Type", 9.0, 155.0);
        canvas.down(4.5);
        for (name, account) in rows {
            canvas.text(name, 9.0, MARGIN_LEFT);
            if let Some(account) = account {
                canvas.text(&account.currency, 9.0, 80.0);
                canvas.text(&account.account_number, 9.0, 105.0);
                canvas.text(&account.account_type, 9.0, 155.0);
            }
            canvas.down(4.5);
        }
    }

    canvas.frame(top, canvas.y + 2.0);
    canvas.down(6.0);
}

fn format_quantity(quantity: Decimal) -> String {
    quantity.normalize().to_string()
}

/// Greedy word wrap on character count.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::document::{ClientInfo, ProviderInfo};
    use crate::billing::quantity::{ResolvedLine, Totals};
    use crate::billing::types::{Bank, BankAccount, BankTransferInfo};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn line(description: &str, quantity: Decimal, price: Decimal) -> ResolvedLine {
        ResolvedLine {
            item_id: Uuid::new_v4(),
            external_item_id: None,
            code: "SUB".into(),
            description: description.into(),
            count_type: "manual".into(),
            quantity,
            unit_price: price,
            line_total: quantity * price,
        }
    }

    fn document(lines: Vec<ResolvedLine>) -> ProformaDocument {
        let totals = Totals::from_lines(&lines);
        ProformaDocument {
            number: "PRO-202403-abc123".into(),
            issue_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            expiration_date: NaiveDate::from_ymd_opt(2024, 4, 12).unwrap(),
            currency: "USD".into(),
            provider: ProviderInfo {
                name: "Agency SRL".into(),
                address: Some("Av. Principal 1".into()),
                phone: Some("809-555-0100".into()),
                logo_url: None,
                tax_id: Some("101-00000-1".into()),
            },
            client: ClientInfo {
                name: "Acme".into(),
                tax_id: Some("131-1".into()),
                address: None,
                contact_name: Some("Ana".into()),
            },
            lines,
            totals,
            exchange_rate: Some(dec!(58.75)),
            notes: Some("Payment due on receipt.\nThank you.".into()),
            bank_transfer: Some(BankTransferInfo {
                beneficiary: "Agency SRL".into(),
                tax_id: Some("101-00000-1".into()),
                banks: vec![Bank {
                    name: "Banco Popular".into(),
                    accounts: vec![
                        BankAccount {
                            currency: "USD".into(),
                            account_number: "000123456".into(),
                            account_type: "Checking".into(),
                        },
                        BankAccount {
                            currency: "DOP".into(),
                            account_number: "000654321".into(),
                            account_type: "Savings".into(),
                        },
                    ],
                }],
            }),
        }
    }

    #[test]
    fn test_renders_pdf_bytes() {
        let doc = document(vec![
            line("CRM users", dec!(3), dec!(10)),
            line("Projects", dec!(3), dec!(20)),
        ]);
        let bytes = render_proforma(&doc).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_many_items_overflow_to_new_pages() {
        let lines = (0..80)
            .map(|i| line(&format!("Line item number {}", i), dec!(1), dec!(1)))
            .collect();
        let bytes = render_proforma(&document(lines)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("", 10), vec![String::new()]);
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert_eq!(
            wrap("averyveryverylongword x", 5),
            vec!["averyveryverylongword", "x"]
        );
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(dec!(3.000)), "3");
        assert_eq!(format_quantity(dec!(2.50)), "2.5");
    }
}
