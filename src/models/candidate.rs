use serde::{Deserialize, Serialize};

/// Canonical field-purpose vocabulary shared with session drivers
///
/// Drivers key their discovered controls by these names; the orchestrator fills by them.
pub mod purpose {
    pub const COUNTRY: &str = "country";
    pub const CITY: &str = "city";
    pub const COUNTRY_TRAVELING_TO: &str = "country_traveling_to";
    pub const FIRST_NAME: &str = "first_name";
    pub const LAST_NAME: &str = "last_name";
    pub const DATE_OF_BIRTH: &str = "date_of_birth";
    pub const NATIONALITY: &str = "nationality";
    pub const GENDER: &str = "gender";
    pub const MARITAL_STATUS: &str = "marital_status";
    pub const PASSPORT_NUMBER: &str = "passport_number";
    pub const CONFIRM_PASSPORT_NUMBER: &str = "confirm_passport_number";
    pub const PASSPORT_ISSUE_DATE: &str = "passport_issue_date";
    pub const PASSPORT_ISSUE_PLACE: &str = "passport_issue_place";
    pub const PASSPORT_EXPIRY: &str = "passport_expiry";
    pub const VISA_TYPE: &str = "visa_type";
    pub const EMAIL: &str = "email";
    pub const PHONE: &str = "phone";
    pub const NATIONAL_ID: &str = "national_id";
    pub const POSITION: &str = "position";

    /// Location triplet filled during the appointment phase
    pub const APPOINTMENT: &[&str] = &[COUNTRY, CITY, COUNTRY_TRAVELING_TO];

    pub const ALL: &[&str] = &[
        COUNTRY,
        CITY,
        COUNTRY_TRAVELING_TO,
        FIRST_NAME,
        LAST_NAME,
        DATE_OF_BIRTH,
        NATIONALITY,
        GENDER,
        MARITAL_STATUS,
        PASSPORT_NUMBER,
        CONFIRM_PASSPORT_NUMBER,
        PASSPORT_ISSUE_DATE,
        PASSPORT_ISSUE_PLACE,
        PASSPORT_EXPIRY,
        VISA_TYPE,
        EMAIL,
        PHONE,
        NATIONAL_ID,
        POSITION,
    ];

    pub fn is_known(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Full candidate record
///
/// Keys accept snake_case as well as the column headers of the tabular export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateRecord {
    #[serde(alias = "Appointment_Location")]
    pub appointment_location: String,
    #[serde(alias = "Country")]
    pub country: String,
    #[serde(alias = "City")]
    pub city: String,
    #[serde(alias = "Country_Traveling_To")]
    pub country_traveling_to: String,
    #[serde(alias = "First_Name")]
    pub first_name: String,
    #[serde(alias = "Last_Name")]
    pub last_name: String,
    #[serde(alias = "Date_Of_Birth")]
    pub date_of_birth: String,
    #[serde(alias = "Nationality")]
    pub nationality: String,
    #[serde(alias = "Gender")]
    pub gender: String,
    #[serde(alias = "Marital_Status")]
    pub marital_status: String,
    #[serde(alias = "Passport_Number")]
    pub passport_number: String,
    #[serde(alias = "Confirm_Passport_Number")]
    pub confirm_passport_number: String,
    #[serde(alias = "Passport_Issue_Date")]
    pub passport_issue_date: String,
    #[serde(alias = "Passport_Issue_Place")]
    pub passport_issue_place: String,
    #[serde(alias = "Passport_Expiry_Date")]
    pub passport_expiry_date: String,
    #[serde(alias = "Visa_Type")]
    pub visa_type: String,
    #[serde(alias = "Email_Address")]
    pub email_address: String,
    #[serde(alias = "Phone")]
    pub phone: String,
    #[serde(alias = "National_ID")]
    pub national_id: String,
    #[serde(alias = "Position_Applied_For")]
    pub position_applied_for: String,
}

/// Location triplet submitted in the appointment phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentPayload {
    pub country: String,
    pub city: String,
    pub country_traveling_to: String,
}

impl AppointmentPayload {
    /// Non-empty (purpose, value) pairs in fill order
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        [
            (purpose::COUNTRY, self.country.as_str()),
            (purpose::CITY, self.city.as_str()),
            (purpose::COUNTRY_TRAVELING_TO, self.country_traveling_to.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect()
    }
}

impl CandidateRecord {
    pub fn appointment(&self) -> AppointmentPayload {
        AppointmentPayload {
            country: self.country.clone(),
            city: self.city.clone(),
            country_traveling_to: self.country_traveling_to.clone(),
        }
    }

    /// Non-empty (purpose, value) pairs filled once a match is found
    pub fn personal_fields(&self) -> Vec<(&'static str, &str)> {
        let confirm = if self.confirm_passport_number.trim().is_empty() {
            self.passport_number.as_str()
        } else {
            self.confirm_passport_number.as_str()
        };

        [
            (purpose::FIRST_NAME, self.first_name.as_str()),
            (purpose::LAST_NAME, self.last_name.as_str()),
            (purpose::DATE_OF_BIRTH, self.date_of_birth.as_str()),
            (purpose::NATIONALITY, self.nationality.as_str()),
            (purpose::GENDER, self.gender.as_str()),
            (purpose::MARITAL_STATUS, self.marital_status.as_str()),
            (purpose::PASSPORT_NUMBER, self.passport_number.as_str()),
            (purpose::CONFIRM_PASSPORT_NUMBER, confirm),
            (purpose::PASSPORT_ISSUE_DATE, self.passport_issue_date.as_str()),
            (purpose::PASSPORT_ISSUE_PLACE, self.passport_issue_place.as_str()),
            (purpose::PASSPORT_EXPIRY, self.passport_expiry_date.as_str()),
            (purpose::VISA_TYPE, self.visa_type.as_str()),
            (purpose::EMAIL, self.email_address.as_str()),
            (purpose::PHONE, self.phone.as_str()),
            (purpose::NATIONAL_ID, self.national_id.as_str()),
            (purpose::POSITION, self.position_applied_for.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// One-line summary for logs and status reports
    pub fn summary(&self) -> String {
        format!("{} - {}", self.full_name(), self.email_address)
    }

    /// A record must at least name the person and the location triplet
    pub fn validate(&self) -> std::result::Result<(), String> {
        let required = [
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("country", &self.country),
            ("city", &self.city),
            ("country_traveling_to", &self.country_traveling_to),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing {}", missing.join(", ")))
        }
    }
}
