pub mod filing;
pub mod party;
pub mod tax_year;

pub use filing::{
    ClientId, Filing, FilingId, FilingStatus, FilingType, NewFiling, ParseEnumError, Priority,
    StatusChange, UserId,
};
pub use party::{Client, Professional, Role};
pub use tax_year::{TaxYear, TaxYearError};
