//! Keyword tables used by merchant and category inference.
//!
//! Order matters in every table: the first entry that matches wins.

/// Known merchants: lowercase keyword and the category label it implies.
pub(super) const MERCHANT_KEYWORDS: &[(&str, &str)] = &[
    ("swiggy", "Food Delivery"),
    ("zomato", "Food Delivery"),
    ("eatsure", "Food Delivery"),
    ("uber", "Ride Hailing"),
    ("olacabs", "Ride Hailing"),
    ("rapido", "Ride Hailing"),
    ("bigbasket", "Groceries"),
    ("blinkit", "Groceries"),
    ("zepto", "Groceries"),
    ("dmart", "Groceries"),
    ("amazon", "Shopping"),
    ("flipkart", "Shopping"),
    ("myntra", "Shopping"),
    ("netflix", "Entertainment"),
    ("spotify", "Entertainment"),
    ("bookmyshow", "Entertainment"),
    ("hotstar", "Entertainment"),
    ("irctc", "Travel"),
    ("makemytrip", "Travel"),
    ("indigo", "Travel"),
    ("airtel", "Telecom"),
    ("jio", "Telecom"),
    ("apollo", "Pharmacy"),
    ("pharmeasy", "Pharmacy"),
    ("1mg", "Pharmacy"),
];

/// Cues checked after the keyword table and payment-address extraction.
/// Each cue maps to a merchant label and a subcategory.
pub(super) const CUES: &[(&[&str], &str, &str)] = &[
    (&["atm", "cash wdl", "cash withdrawal"], "Cash Withdrawal", "ATM"),
    (&["salary", "payroll", "sal cr"], "Income", "Salary"),
    (&["interest", "int.pd", "int cr"], "Income", "Interest"),
];

/// Fallback category rules for descriptions with no recognizable merchant.
pub(super) const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Food & Dining",
        &["restaurant", "cafe", "dhaba", "bakery", "pizza", "food", "kitchen"],
    ),
    (
        "Transport",
        &["fuel", "petrol", "diesel", "metro", "parking", "toll", "fastag", "taxi", "cab"],
    ),
    (
        "Healthcare",
        &["pharmacy", "hospital", "clinic", "medical", "diagnostic", "chemist"],
    ),
    (
        "Education",
        &["school", "college", "university", "tuition", "course", "academy"],
    ),
    (
        "Utilities",
        &["electricity", "water", "broadband", "recharge", "gas", "bill"],
    ),
    ("Income", &["salary", "interest", "refund", "cashback", "dividend"]),
    ("Cash Withdrawal", &["atm", "cash wdl", "cash withdrawal"]),
    ("Bank Transfer", &["neft", "imps", "rtgs", "transfer", "upi"]),
];

pub(super) const UNKNOWN_MERCHANT: &str = "Unknown";
pub(super) const UNCATEGORIZED: &str = "Uncategorized";
