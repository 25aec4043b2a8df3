use crate::domain::ledger::Property;
use crate::domain::money::Amount;
use crate::domain::phone::PhoneNumber;
use crate::error::{BillingError, Result};
use serde::Deserialize;
use std::io::Read;

/// One row of a tenant directory file: the tenant and the unit they rent.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DirectoryRecord {
    pub tenant: u32,
    pub name: String,
    pub phone: PhoneNumber,
    pub property: u32,
    pub title: String,
    pub landlord: String,
    pub rent: Amount,
}

impl DirectoryRecord {
    pub fn property(&self) -> Property {
        Property {
            id: self.property,
            title: self.title.clone(),
            landlord: self.landlord.clone(),
            rent_price: self.rent,
        }
    }
}

/// Reads `tenant,name,phone,property,title,landlord,rent` rows.
pub struct DirectoryReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> DirectoryReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    pub fn records(self) -> impl Iterator<Item = Result<DirectoryRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BillingError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reads_directory_rows() {
        let data = "tenant,name,phone,property,title,landlord,rent\n\
                    1,Wanjiku,0712345678,10,\"Block A, House 4\",landlord@example.com,12000\n";
        let records: Vec<DirectoryRecord> = DirectoryReader::new(data.as_bytes())
            .records()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].phone.as_str(), "254712345678");
        let property = records[0].property();
        assert_eq!(property.title, "Block A, House 4");
        assert_eq!(property.rent_price.value(), dec!(12000));
    }

    #[test]
    fn test_rejects_invalid_phone_and_rent() {
        let data = "tenant,name,phone,property,title,landlord,rent\n\
                    1,A,12345,10,T,L,100\n\
                    2,B,0712345678,10,T,L,0\n";
        let results: Vec<Result<DirectoryRecord>> =
            DirectoryReader::new(data.as_bytes()).records().collect();
        assert!(results.iter().all(|r| r.is_err()));
    }
}
