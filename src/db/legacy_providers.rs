//! Legacy bank type codes → canonical provider identifiers.
//!
//! Older stores identified the bank behind a connection by a numeric type
//! code. Codes that are absent here belong to retired banks and have no
//! canonical provider.

/// Sorted by code so lookups can binary search.
const LEGACY_PROVIDERS: &[(i64, &str)] = &[
    (1, "swedbank"),
    (2, "nordea"),
    (3, "ica-banken"),
    (4, "lansforsakringar"),
    (6, "handelsbanken"),
    (7, "seb"),
    (8, "avanza"),
    (10, "ikano-bank"),
    (11, "skandiabanken"),
    (12, "sparbanken-syd"),
    (13, "eurocard"),
    (14, "first-card"),
    (15, "nordnet"),
    (16, "sas-eurobonus-mastercard"),
    (17, "preem"),
    (18, "statoil"),
    (20, "resurs-bank"),
    (21, "ica-kort"),
    (22, "payson"),
    (24, "osuuspankki"),
    (26, "bitcoin"),
    (28, "blekinge-sparbank"),
    (29, "marginalen-bank"),
    (31, "american-express"),
    (33, "jojo-reskassa"),
    (35, "steam-wallet"),
    (37, "danske-bank"),
    (38, "volvofinans"),
];

/// Canonical provider id for a legacy type code, or `None` for retired and unknown codes.
pub fn resolve(legacy_code: i64) -> Option<&'static str> {
    LEGACY_PROVIDERS
        .binary_search_by_key(&legacy_code, |(code, _)| *code)
        .ok()
        .map(|idx| LEGACY_PROVIDERS[idx].1)
}

pub fn is_available(legacy_code: i64) -> bool {
    resolve(legacy_code).is_some()
}
