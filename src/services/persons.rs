use anyhow::{anyhow, Result};
use validator::Validate;

use super::invalid_field;
use crate::db::{found, NewPerson, PersonRepo, Store};
use crate::models::*;
use crate::rules::{self, RuleViolation};

#[cfg(not(test))]
const BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| anyhow!("Failed to hash password: {}", e))
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn normalize_phone(phone: Option<&String>) -> Option<String> {
    phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty())
}

async fn ensure_unique_contact(
    conn: &mut sqlx::SqliteConnection,
    email: &str,
    phone: Option<&str>,
    except: Option<i64>,
) -> Result<()> {
    if PersonRepo::email_taken(conn, email, except).await? {
        return Err(RuleViolation::EmailTaken.into());
    }
    if let Some(phone) = phone {
        if PersonRepo::phone_taken(conn, phone, except).await? {
            return Err(RuleViolation::PhoneTaken.into());
        }
    }
    Ok(())
}

/// Public sign-up. Landlords start unverified with a pending owner request.
pub async fn register(store: &Store, req: &RegisterRequest) -> Result<Person> {
    req.validate()?;
    let (role, owner_request) = rules::registration_role(req.role)?;

    let email = normalize_email(&req.email);
    let phone = normalize_phone(req.phone.as_ref());
    let password_hash = hash_password(&req.password)?;

    let mut tx = store.begin().await?;
    ensure_unique_contact(&mut tx, &email, phone.as_deref(), None).await?;
    let person = PersonRepo::create(
        &mut tx,
        &NewPerson {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            email,
            phone,
            address: None,
            role,
            verified: false,
            owner_request,
            password_hash,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!("Registered {} as {}", person.email, person.role);
    Ok(person)
}

/// Check credentials; `None` on unknown email or wrong password
pub async fn authenticate(store: &Store, email: &str, password: &str) -> Result<Option<Person>> {
    let Some(person) = store.get_person_by_email(email).await? else {
        return Ok(None);
    };
    let ok = bcrypt::verify(password, &person.password_hash).unwrap_or(false);
    Ok(ok.then_some(person))
}

pub async fn get(store: &Store, id: i64) -> Result<Person> {
    found(store.get_person(id).await?, "Person", id)
}

/// Admin account creation, any role
pub async fn create(store: &Store, req: &CreatePersonRequest) -> Result<Person> {
    req.validate()?;

    let email = normalize_email(&req.email);
    let phone = normalize_phone(req.phone.as_ref());
    let password_hash = hash_password(&req.password)?;

    let mut tx = store.begin().await?;
    ensure_unique_contact(&mut tx, &email, phone.as_deref(), None).await?;
    let person = PersonRepo::create(
        &mut tx,
        &NewPerson {
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            email,
            phone,
            address: req.address.clone(),
            role: req.role,
            verified: req.verified || req.role == Role::Admin,
            owner_request: false,
            password_hash,
        },
    )
    .await?;
    tx.commit().await?;

    tracing::info!("Created {} account {}", person.role, person.email);
    Ok(person)
}

pub async fn update(store: &Store, id: i64, req: &UpdatePersonRequest) -> Result<Person> {
    req.validate()?;

    let mut tx = store.begin().await?;
    let mut person = found(PersonRepo::get(&mut tx, id).await?, "Person", id)?;
    let email = normalize_email(&req.email);
    let phone = normalize_phone(req.phone.as_ref());
    ensure_unique_contact(&mut tx, &email, phone.as_deref(), Some(id)).await?;

    person.first_name = req.first_name.trim().to_string();
    person.last_name = req.last_name.trim().to_string();
    person.email = email;
    person.phone = phone;
    person.address = req.address.clone();
    if person.role != req.role {
        tracing::info!("Changing role of {} from {} to {}", person.email, person.role, req.role);
    }
    person.role = req.role;
    person.verified = req.verified;
    let person = PersonRepo::save(&mut tx, &person).await?;
    tx.commit().await?;
    Ok(person)
}

pub async fn update_profile(store: &Store, id: i64, req: &UpdateProfileRequest) -> Result<Person> {
    req.validate()?;

    let mut tx = store.begin().await?;
    let mut person = found(PersonRepo::get(&mut tx, id).await?, "Person", id)?;
    let phone = normalize_phone(req.phone.as_ref());
    if let Some(phone) = phone.as_deref() {
        if PersonRepo::phone_taken(&mut tx, phone, Some(id)).await? {
            return Err(RuleViolation::PhoneTaken.into());
        }
    }
    person.first_name = req.first_name.trim().to_string();
    person.last_name = req.last_name.trim().to_string();
    person.phone = phone;
    person.address = req.address.clone();
    let person = PersonRepo::save(&mut tx, &person).await?;
    tx.commit().await?;
    Ok(person)
}

pub async fn change_password(store: &Store, id: i64, req: &ChangePasswordRequest) -> Result<()> {
    req.validate()?;

    let mut tx = store.begin().await?;
    let mut person = found(PersonRepo::get(&mut tx, id).await?, "Person", id)?;
    if !bcrypt::verify(&req.old_password, &person.password_hash).unwrap_or(false) {
        return Err(RuleViolation::WrongPassword.into());
    }
    if req.old_password == req.new_password {
        return Err(invalid_field("new_password", "new password must differ from the current one"));
    }
    person.password_hash = hash_password(&req.new_password)?;
    PersonRepo::save(&mut tx, &person).await?;
    tx.commit().await?;

    tracing::info!("Password changed for person {}", id);
    Ok(())
}

/// Delete an account that owns no listing and holds no lease
pub async fn delete(store: &Store, id: i64) -> Result<()> {
    let mut tx = store.begin().await?;
    found(PersonRepo::get(&mut tx, id).await?, "Person", id)?;
    if PersonRepo::in_use(&mut tx, id).await? {
        return Err(RuleViolation::PersonInUse.into());
    }
    PersonRepo::delete(&mut tx, id).await?;
    tx.commit().await?;

    tracing::info!("Deleted person {}", id);
    Ok(())
}

/// A tenant asks to become a landlord
pub async fn request_owner(store: &Store, id: i64) -> Result<Person> {
    let mut tx = store.begin().await?;
    let mut person = found(PersonRepo::get(&mut tx, id).await?, "Person", id)?;
    rules::ensure_tenant(&person)?;
    person.owner_request = true;
    let person = PersonRepo::save(&mut tx, &person).await?;
    tx.commit().await?;

    tracing::info!("Owner request filed by {}", person.email);
    Ok(person)
}

pub async fn approve_owner(store: &Store, id: i64) -> Result<Person> {
    let mut tx = store.begin().await?;
    let mut person = found(PersonRepo::get(&mut tx, id).await?, "Person", id)?;
    if !person.owner_request {
        return Err(RuleViolation::NoOwnerRequest.into());
    }
    person.role = Role::Landlord;
    person.verified = true;
    person.owner_request = false;
    let person = PersonRepo::save(&mut tx, &person).await?;
    tx.commit().await?;

    tracing::info!("Approved {} as landlord", person.email);
    Ok(person)
}

pub async fn reject_owner(store: &Store, id: i64) -> Result<Person> {
    let mut tx = store.begin().await?;
    let mut person = found(PersonRepo::get(&mut tx, id).await?, "Person", id)?;
    if !person.owner_request {
        return Err(RuleViolation::NoOwnerRequest.into());
    }
    person.owner_request = false;
    person.verified = false;
    let person = PersonRepo::save(&mut tx, &person).await?;
    tx.commit().await?;

    tracing::info!("Rejected owner request of {}", person.email);
    Ok(person)
}
