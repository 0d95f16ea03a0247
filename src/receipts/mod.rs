//! PDF rent receipts ("quittances") for captured payments.

use anyhow::{anyhow, Result};
use printpdf::{BuiltinFont, Mm, PdfDocument};

use crate::models::{Lease, Listing, Payment, Person};
use crate::rules::month_end;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 20.0;

const LEGAL_MENTION: [&str; 3] = [
    "This receipt confirms payment of the rent and charges for the period above.",
    "It cancels any previous receipt for the same period and is issued subject",
    "to collection. It does not imply a waiver of any other sums still due.",
];

/// Everything a receipt prints
pub struct ReceiptData<'a> {
    pub payment: &'a Payment,
    pub lease: &'a Lease,
    pub listing: &'a Listing,
    pub tenant: &'a Person,
    pub landlord: &'a Person,
}

/// File name of the cached PDF for a payment
pub fn file_name(payment: &Payment) -> String {
    format!("receipt-{}.pdf", payment.reference)
}

/// One text run on the page
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub size: f32,
    pub x: f32,
    pub y: f32,
    pub bold: bool,
}

// Builtin PDF fonts only cover WinAnsi; keep the output plain ASCII
fn ascii(text: &str) -> String {
    text.chars().map(|c| if c.is_ascii() { c } else { '?' }).collect()
}

struct Layout {
    lines: Vec<TextLine>,
    y: f32,
}

impl Layout {
    fn push(&mut self, text: impl AsRef<str>, size: f32, bold: bool) {
        self.lines.push(TextLine {
            text: ascii(text.as_ref()),
            size,
            x: MARGIN,
            y: self.y,
            bold,
        });
        self.y -= size * 0.5 + 2.0;
    }

    fn gap(&mut self) {
        self.y -= 6.0;
    }
}

fn party_block(layout: &mut Layout, title: &str, person: &Person) {
    layout.push(title, 12.0, true);
    layout.push(person.full_name(), 10.0, false);
    layout.push(&person.email, 10.0, false);
    if let Some(phone) = &person.phone {
        layout.push(phone, 10.0, false);
    }
    if let Some(address) = &person.address {
        layout.push(address, 10.0, false);
    }
    layout.gap();
}

/// Lay out the receipt top to bottom
pub fn layout(data: &ReceiptData<'_>) -> Vec<TextLine> {
    let payment = data.payment;
    let currency = &payment.currency;
    let mut layout = Layout {
        lines: Vec::new(),
        y: PAGE_HEIGHT - MARGIN - 5.0,
    };

    layout.push("RENT RECEIPT", 20.0, true);
    layout.push(format!("Receipt for payment {}", payment.reference), 10.0, false);
    layout.gap();

    party_block(&mut layout, "Landlord", data.landlord);
    party_block(&mut layout, "Tenant", data.tenant);

    layout.push("Property", 12.0, true);
    layout.push(format!("Listing {}", data.listing.reference), 10.0, false);
    layout.push(&data.listing.address, 10.0, false);
    layout.push(format!("{} {}", data.listing.postal_code, data.listing.city), 10.0, false);
    layout.push(format!("Lease {}", data.lease.reference), 10.0, false);
    layout.gap();

    layout.push("Period", 12.0, true);
    layout.push(
        format!(
            "From {} to {}",
            payment.month.format("%d/%m/%Y"),
            month_end(payment.month).format("%d/%m/%Y")
        ),
        10.0,
        false,
    );
    layout.gap();

    layout.push("Amounts", 12.0, true);
    layout.push(format!("Rent: {} {}", payment.rent_amount, currency), 10.0, false);
    layout.push(format!("Charges: {} {}", payment.charges_amount, currency), 10.0, false);
    layout.push(format!("Total paid: {} {}", payment.total_amount, currency), 11.0, true);
    layout.gap();

    layout.push("Payment", 12.0, true);
    if let Some(captured_at) = payment.captured_at {
        layout.push(format!("Received on {}", captured_at.format("%d/%m/%Y %H:%M UTC")), 10.0, false);
    }
    if let Some(method) = &payment.payment_method {
        layout.push(format!("Method: {}", method), 10.0, false);
    }
    if let Some(transaction_ref) = &payment.transaction_ref {
        layout.push(format!("Transaction: {}", transaction_ref), 10.0, false);
    }
    layout.gap();

    for line in LEGAL_MENTION {
        layout.push(line, 8.0, false);
    }

    layout.lines
}

/// Render the receipt as PDF bytes
pub fn render(data: &ReceiptData<'_>) -> Result<Vec<u8>> {
    let title = format!("Receipt {}", data.payment.reference);
    let (doc, page, layer) = PdfDocument::new(&title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("Failed to load PDF font: {:?}", e))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| anyhow!("Failed to load PDF font: {:?}", e))?;

    let canvas = doc.get_page(page).get_layer(layer);
    for line in layout(data) {
        let font = if line.bold { &bold } else { &regular };
        canvas.use_text(line.text, line.size, Mm(line.x), Mm(line.y), font);
    }

    doc.save_to_bytes()
        .map_err(|e| anyhow!("Failed to render receipt {}: {:?}", data.payment.reference, e))
}
