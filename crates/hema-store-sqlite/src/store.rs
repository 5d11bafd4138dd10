//! [`SqliteMarket`] — the SQLite implementation of [`MarketStore`].

use std::{
  collections::HashMap,
  path::Path,
  sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use tokio::sync::watch;
use uuid::Uuid;

use hema_core::{
  blood::BloodGroup,
  facility::{ApprovalChange, Facility},
  ledger::{NewTransaction, RevenueLedger, Transaction},
  profile::Profile,
  request::{Donation, Request},
  store::MarketStore,
  watch::{RecordWatch, Subscription},
};

use crate::{
  Error, Result,
  encode::{
    RawDonation, RawFacility, RawLedger, RawProfile, RawRequest,
    RawTransaction, encode_date, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Watch registry ──────────────────────────────────────────────────────────

/// One broadcast channel per watched facility, plus the number of live
/// guards against it. The entry is removed when the last guard cancels.
struct FacilityChannel {
  tx:     watch::Sender<Option<Facility>>,
  guards: usize,
}

type WatchRegistry = Arc<Mutex<HashMap<Uuid, FacilityChannel>>>;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A marketplace store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted and the
/// watch registry is shared.
#[derive(Clone)]
pub struct SqliteMarket {
  conn:     tokio_rusqlite::Connection,
  watchers: WatchRegistry,
}

impl SqliteMarket {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn, watchers: WatchRegistry::default() };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn, watchers: WatchRegistry::default() };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of live watch guards against one facility record.
  /// Test probe for subscription leaks.
  pub fn facility_watch_count(&self, id: Uuid) -> usize {
    lock(&self.watchers).get(&id).map(|c| c.guards).unwrap_or(0)
  }

  /// Push a fresh facility value to any live watchers. Skipped when the
  /// value is unchanged, so re-seeding does not wake consumers.
  fn publish_facility(&self, id: Uuid, value: Option<Facility>) {
    if let Some(chan) = lock(&self.watchers).get(&id) {
      chan.tx.send_if_modified(|current| {
        if *current == value {
          false
        } else {
          *current = value;
          true
        }
      });
    }
  }

  /// Load a facility row and its inventory rows.
  async fn load_facility(&self, id: Uuid) -> Result<Option<Facility>> {
    let id_str = encode_uuid(id);

    let raw: Option<(RawFacility, Vec<(String, u32)>)> = self
      .conn
      .call(move |conn| {
        let raw = conn
          .query_row(
            "SELECT subject_id, name, license_no, contact_phone, address,
                    price_per_unit, status, approved_at, rejected_at, created_at
             FROM facilities WHERE subject_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawFacility {
                subject_id:     row.get(0)?,
                name:           row.get(1)?,
                license_no:     row.get(2)?,
                contact_phone:  row.get(3)?,
                address:        row.get(4)?,
                price_per_unit: row.get(5)?,
                status:         row.get(6)?,
                approved_at:    row.get(7)?,
                rejected_at:    row.get(8)?,
                created_at:     row.get(9)?,
              })
            },
          )
          .optional()?;

        let Some(raw) = raw else { return Ok(None) };

        let mut stmt = conn
          .prepare("SELECT blood_group, units FROM inventory WHERE facility_id = ?1")?;
        let inventory = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((raw, inventory)))
      })
      .await?;

    raw.map(|(raw, inv)| raw.into_facility(inv)).transpose()
  }
}

// ─── MarketStore impl ────────────────────────────────────────────────────────

impl MarketStore for SqliteMarket {
  type Error = Error;

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawProfile> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT subject_id, display_name, email, phone, raw_role, created_at
               FROM profiles WHERE subject_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawProfile {
                  subject_id:   row.get(0)?,
                  display_name: row.get(1)?,
                  email:        row.get(2)?,
                  phone:        row.get(3)?,
                  raw_role:     row.get(4)?,
                  created_at:   row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawProfile::into_profile).transpose()
  }

  async fn put_profile(&self, profile: &Profile) -> Result<()> {
    let id_str        = encode_uuid(profile.subject_id);
    let display_name  = profile.display_name.clone();
    let email         = profile.email.clone();
    let phone         = profile.phone.clone();
    let raw_role      = profile.raw_role.clone();
    let created_at    = encode_dt(profile.created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO profiles
             (subject_id, display_name, email, phone, raw_role, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            id_str,
            display_name,
            email,
            phone,
            raw_role,
            created_at
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_profile(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM profiles WHERE subject_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Facilities ────────────────────────────────────────────────────────────

  async fn get_facility(&self, id: Uuid) -> Result<Option<Facility>> {
    self.load_facility(id).await
  }

  async fn put_facility(&self, facility: &Facility) -> Result<()> {
    let id_str         = encode_uuid(facility.subject_id);
    let name           = facility.name.clone();
    let license_no     = facility.license_no.clone();
    let contact_phone  = facility.contact_phone.clone();
    let address        = facility.address.clone();
    let price_per_unit = facility.price_per_unit;
    let status         = facility.status.to_string();
    let approved_at    = facility.approved_at.map(encode_dt);
    let rejected_at    = facility.rejected_at.map(encode_dt);
    let created_at     = encode_dt(facility.created_at);
    let inventory: Vec<(String, u32)> = facility
      .inventory
      .iter()
      .map(|(group, units)| (group.to_string(), *units))
      .collect();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO facilities
             (subject_id, name, license_no, contact_phone, address,
              price_per_unit, status, approved_at, rejected_at, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
          rusqlite::params![
            id_str,
            name,
            license_no,
            contact_phone,
            address,
            price_per_unit,
            status,
            approved_at,
            rejected_at,
            created_at
          ],
        )?;
        conn.execute(
          "DELETE FROM inventory WHERE facility_id = ?1",
          rusqlite::params![id_str],
        )?;
        for (group, units) in &inventory {
          conn.execute(
            "INSERT INTO inventory (facility_id, blood_group, units)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, group, units],
          )?;
        }
        Ok(())
      })
      .await?;

    self.publish_facility(facility.subject_id, Some(facility.clone()));
    Ok(())
  }

  async fn delete_facility(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM facilities WHERE subject_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;

    self.publish_facility(id, None);
    Ok(())
  }

  async fn list_facilities(&self, only_approved: bool) -> Result<Vec<Facility>> {
    let raws: Vec<(RawFacility, Vec<(String, u32)>)> = self
      .conn
      .call(move |conn| {
        let sql = if only_approved {
          "SELECT subject_id, name, license_no, contact_phone, address,
                  price_per_unit, status, approved_at, rejected_at, created_at
           FROM facilities WHERE status = 'approved' ORDER BY name"
        } else {
          "SELECT subject_id, name, license_no, contact_phone, address,
                  price_per_unit, status, approved_at, rejected_at, created_at
           FROM facilities ORDER BY name"
        };
        let mut stmt = conn.prepare(sql)?;
        let facilities = stmt
          .query_map([], |row| {
            Ok(RawFacility {
              subject_id:     row.get(0)?,
              name:           row.get(1)?,
              license_no:     row.get(2)?,
              contact_phone:  row.get(3)?,
              address:        row.get(4)?,
              price_per_unit: row.get(5)?,
              status:         row.get(6)?,
              approved_at:    row.get(7)?,
              rejected_at:    row.get(8)?,
              created_at:     row.get(9)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut inv_stmt = conn
          .prepare("SELECT blood_group, units FROM inventory WHERE facility_id = ?1")?;
        let mut out = Vec::with_capacity(facilities.len());
        for raw in facilities {
          let inventory = inv_stmt
            .query_map(rusqlite::params![raw.subject_id], |row| {
              Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          out.push((raw, inventory));
        }
        Ok(out)
      })
      .await?;

    raws
      .into_iter()
      .map(|(raw, inv)| raw.into_facility(inv))
      .collect()
  }

  async fn update_facility_approval(
    &self,
    id: Uuid,
    change: ApprovalChange,
  ) -> Result<Option<Facility>> {
    let id_str      = encode_uuid(id);
    let status      = change.status.to_string();
    let approved_at = change.approved_at.map(encode_dt);
    let rejected_at = change.rejected_at.map(encode_dt);

    let updated: usize = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE facilities
           SET status = ?2, approved_at = ?3, rejected_at = ?4
           WHERE subject_id = ?1",
          rusqlite::params![id_str, status, approved_at, rejected_at],
        )?)
      })
      .await?;

    if updated == 0 {
      return Ok(None);
    }

    let facility = self.load_facility(id).await?;
    self.publish_facility(id, facility.clone());
    Ok(facility)
  }

  async fn set_inventory(
    &self,
    facility_id: Uuid,
    group: BloodGroup,
    units: u32,
  ) -> Result<Option<Facility>> {
    let id_str    = encode_uuid(facility_id);
    let group_str = group.to_string();

    let exists: bool = self
      .conn
      .call(move |conn| {
        let exists: bool = conn
          .query_row(
            "SELECT 1 FROM facilities WHERE subject_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if exists {
          conn.execute(
            "INSERT OR REPLACE INTO inventory (facility_id, blood_group, units)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, group_str, units],
          )?;
        }
        Ok(exists)
      })
      .await?;

    if !exists {
      return Ok(None);
    }

    let facility = self.load_facility(facility_id).await?;
    self.publish_facility(facility_id, facility.clone());
    Ok(facility)
  }

  async fn watch_facility(&self, id: Uuid) -> Result<RecordWatch<Facility>> {
    let current = self.load_facility(id).await?;

    let rx = {
      let mut registry = lock(&self.watchers);
      let chan = registry.entry(id).or_insert_with(|| FacilityChannel {
        tx:     watch::channel(None).0,
        guards: 0,
      });
      chan.guards += 1;
      chan.tx.send_if_modified(|value| {
        if *value == current {
          false
        } else {
          *value = current;
          true
        }
      });
      chan.tx.subscribe()
    };

    let watchers = Arc::clone(&self.watchers);
    let guard = Subscription::new(move || {
      let mut registry = lock(&watchers);
      if let Some(chan) = registry.get_mut(&id) {
        chan.guards -= 1;
        if chan.guards == 0 {
          registry.remove(&id);
        }
      }
    });

    Ok(RecordWatch { rx, guard })
  }

  // ── Requests ──────────────────────────────────────────────────────────────

  async fn get_request(&self, id: Uuid) -> Result<Option<Request>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawRequest> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT request_id, facility_id, requester_id, blood_group,
                      units, total_cost, status, created_at, completed_at
               FROM requests WHERE request_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawRequest {
                  request_id:   row.get(0)?,
                  facility_id:  row.get(1)?,
                  requester_id: row.get(2)?,
                  blood_group:  row.get(3)?,
                  units:        row.get(4)?,
                  total_cost:   row.get(5)?,
                  status:       row.get(6)?,
                  created_at:   row.get(7)?,
                  completed_at: row.get(8)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawRequest::into_request).transpose()
  }

  async fn put_request(&self, request: &Request) -> Result<()> {
    let request_id   = encode_uuid(request.request_id);
    let facility_id  = encode_uuid(request.facility_id);
    let requester_id = encode_uuid(request.requester_id);
    let blood_group  = request.blood_group.to_string();
    let units        = request.units;
    let total_cost   = request.total_cost;
    let status       = request.status.to_string();
    let created_at   = encode_dt(request.created_at);
    let completed_at = request.completed_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO requests
             (request_id, facility_id, requester_id, blood_group, units,
              total_cost, status, created_at, completed_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
          rusqlite::params![
            request_id,
            facility_id,
            requester_id,
            blood_group,
            units,
            total_cost,
            status,
            created_at,
            completed_at
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn requests_for_facility(&self, facility_id: Uuid) -> Result<Vec<Request>> {
    let id_str = encode_uuid(facility_id);

    let raws: Vec<RawRequest> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT request_id, facility_id, requester_id, blood_group,
                  units, total_cost, status, created_at, completed_at
           FROM requests WHERE facility_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawRequest {
              request_id:   row.get(0)?,
              facility_id:  row.get(1)?,
              requester_id: row.get(2)?,
              blood_group:  row.get(3)?,
              units:        row.get(4)?,
              total_cost:   row.get(5)?,
              status:       row.get(6)?,
              created_at:   row.get(7)?,
              completed_at: row.get(8)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRequest::into_request).collect()
  }

  // ── Donations ─────────────────────────────────────────────────────────────

  async fn get_donation(&self, id: Uuid) -> Result<Option<Donation>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawDonation> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT donation_id, donor_id, facility_id, blood_group,
                      preferred_date, status, created_at, completed_at
               FROM donations WHERE donation_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawDonation {
                  donation_id:    row.get(0)?,
                  donor_id:       row.get(1)?,
                  facility_id:    row.get(2)?,
                  blood_group:    row.get(3)?,
                  preferred_date: row.get(4)?,
                  status:         row.get(5)?,
                  created_at:     row.get(6)?,
                  completed_at:   row.get(7)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDonation::into_donation).transpose()
  }

  async fn put_donation(&self, donation: &Donation) -> Result<()> {
    let donation_id    = encode_uuid(donation.donation_id);
    let donor_id       = encode_uuid(donation.donor_id);
    let facility_id    = encode_uuid(donation.facility_id);
    let blood_group    = donation.blood_group.to_string();
    let preferred_date = encode_date(donation.preferred_date);
    let status         = donation.status.to_string();
    let created_at     = encode_dt(donation.created_at);
    let completed_at   = donation.completed_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO donations
             (donation_id, donor_id, facility_id, blood_group,
              preferred_date, status, created_at, completed_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            donation_id,
            donor_id,
            facility_id,
            blood_group,
            preferred_date,
            status,
            created_at,
            completed_at
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn donations_for_donor(&self, donor_id: Uuid) -> Result<Vec<Donation>> {
    let id_str = encode_uuid(donor_id);

    let raws: Vec<RawDonation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT donation_id, donor_id, facility_id, blood_group,
                  preferred_date, status, created_at, completed_at
           FROM donations WHERE donor_id = ?1 ORDER BY preferred_date",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawDonation {
              donation_id:    row.get(0)?,
              donor_id:       row.get(1)?,
              facility_id:    row.get(2)?,
              blood_group:    row.get(3)?,
              preferred_date: row.get(4)?,
              status:         row.get(5)?,
              created_at:     row.get(6)?,
              completed_at:   row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDonation::into_donation).collect()
  }

  // ── Ledger and transactions ───────────────────────────────────────────────

  async fn get_ledger(&self, facility_id: Uuid) -> Result<Option<RevenueLedger>> {
    let id_str = encode_uuid(facility_id);

    let raw: Option<RawLedger> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT facility_id, total_revenue, monthly_revenue,
                      weekly_revenue, completed_transactions, updated_at
               FROM ledgers WHERE facility_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawLedger {
                  facility_id:            row.get(0)?,
                  total_revenue:          row.get(1)?,
                  monthly_revenue:        row.get(2)?,
                  weekly_revenue:         row.get(3)?,
                  completed_transactions: row.get(4)?,
                  updated_at:             row.get(5)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawLedger::into_ledger).transpose()
  }

  async fn credit_ledger(
    &self,
    facility_id: Uuid,
    amount: i64,
    at: DateTime<Utc>,
  ) -> Result<RevenueLedger> {
    let id_str = encode_uuid(facility_id);
    let at_str = encode_dt(at);

    let raw: RawLedger = self
      .conn
      .call(move |conn| {
        // Single-statement upsert-increment: concurrent credits serialize
        // inside SQLite and never lose an update.
        conn.execute(
          "INSERT INTO ledgers
             (facility_id, total_revenue, monthly_revenue, weekly_revenue,
              completed_transactions, updated_at)
           VALUES (?1, ?2, ?2, ?2, 1, ?3)
           ON CONFLICT(facility_id) DO UPDATE SET
             total_revenue          = total_revenue + excluded.total_revenue,
             monthly_revenue        = monthly_revenue + excluded.monthly_revenue,
             weekly_revenue         = weekly_revenue + excluded.weekly_revenue,
             completed_transactions = completed_transactions + 1,
             updated_at             = excluded.updated_at",
          rusqlite::params![id_str, amount, at_str],
        )?;

        conn.query_row(
          "SELECT facility_id, total_revenue, monthly_revenue,
                  weekly_revenue, completed_transactions, updated_at
           FROM ledgers WHERE facility_id = ?1",
          rusqlite::params![id_str],
          |row| {
            Ok(RawLedger {
              facility_id:            row.get(0)?,
              total_revenue:          row.get(1)?,
              monthly_revenue:        row.get(2)?,
              weekly_revenue:         row.get(3)?,
              completed_transactions: row.get(4)?,
              updated_at:             row.get(5)?,
            })
          },
        )
        .map_err(Into::into)
      })
      .await?;

    raw.into_ledger()
  }

  async fn append_transaction(&self, tx: NewTransaction) -> Result<Transaction> {
    let transaction = Transaction {
      transaction_id: Uuid::new_v4(),
      facility_id:    tx.facility_id,
      request_id:     tx.request_id,
      blood_group:    tx.blood_group,
      amount:         tx.amount,
      recorded_at:    Utc::now(),
    };

    let transaction_id = encode_uuid(transaction.transaction_id);
    let facility_id    = encode_uuid(transaction.facility_id);
    let request_id     = encode_uuid(transaction.request_id);
    let blood_group    = transaction.blood_group.to_string();
    let amount         = transaction.amount;
    let recorded_at    = encode_dt(transaction.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO transactions
             (transaction_id, facility_id, request_id, blood_group,
              amount, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            transaction_id,
            facility_id,
            request_id,
            blood_group,
            amount,
            recorded_at
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(transaction)
  }

  async fn transactions_for_facility(
    &self,
    facility_id: Uuid,
  ) -> Result<Vec<Transaction>> {
    let id_str = encode_uuid(facility_id);

    let raws: Vec<RawTransaction> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT transaction_id, facility_id, request_id, blood_group,
                  amount, recorded_at
           FROM transactions WHERE facility_id = ?1 ORDER BY recorded_at",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawTransaction {
              transaction_id: row.get(0)?,
              facility_id:    row.get(1)?,
              request_id:     row.get(2)?,
              blood_group:    row.get(3)?,
              amount:         row.get(4)?,
              recorded_at:    row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawTransaction::into_transaction)
      .collect()
  }
}
