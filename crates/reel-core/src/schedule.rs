//! Calendar queries and scheduling over the card store
//!
//! Nothing here keeps its own copy of card data: every query walks the
//! `CardStore`. Dates are plain calendar days (`NaiveDate`), so a card set
//! for June 5 groups under June 5 in every timezone.

use crate::board::CardStore;
use crate::card::{Card, Scheduling, SchedulingStatus, StageId};
use crate::{Error, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Cards sharing one calendar day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub date: NaiveDate,
    /// Sorted by card id
    pub card_ids: Vec<String>,
}

/// Assign a publish date. Stage membership is not touched.
pub fn schedule(store: &mut CardStore, card_id: &str, date: NaiveDate) -> Result<()> {
    store.modify(card_id, |card| card.scheduling = Scheduling::Scheduled(date))
}

/// Clear a card's date, falling back to `fallback` status
pub fn unschedule(store: &mut CardStore, card_id: &str, fallback: SchedulingStatus) -> Result<()> {
    store.modify(card_id, |card| {
        card.scheduling = Scheduling::unscheduled(fallback);
    })
}

/// Queue a card for scheduling without picking a date
pub fn mark_to_schedule(store: &mut CardStore, card_id: &str) -> Result<()> {
    let card = store
        .get(card_id)
        .ok_or_else(|| Error::NotFound(card_id.to_string()))?;
    if let Scheduling::Scheduled(date) = card.scheduling {
        return Err(Error::InvalidState(format!(
            "{} is already scheduled for {}",
            card_id, date
        )));
    }
    store.modify(card_id, |card| card.scheduling = Scheduling::ToSchedule)
}

/// Every card scheduled on `date`, ordered by id
pub fn cards_on_date(store: &CardStore, date: NaiveDate) -> Vec<&Card> {
    let mut cards: Vec<&Card> = store
        .cards()
        .filter(|c| c.scheduled_date() == Some(date))
        .collect();
    cards.sort_by(|a, b| a.id.cmp(&b.id));
    cards
}

/// Scheduled cards grouped per day for `start..=end`, in date order
pub fn entries_between(store: &CardStore, start: NaiveDate, end: NaiveDate) -> Vec<ScheduleEntry> {
    let mut grouped: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
    for card in store.cards() {
        if let Some(date) = card.scheduled_date()
            && date >= start
            && date <= end
        {
            grouped.entry(date).or_default().push(card.id.clone());
        }
    }

    grouped
        .into_iter()
        .map(|(date, mut card_ids)| {
            card_ids.sort();
            ScheduleEntry { date, card_ids }
        })
        .collect()
}

/// Entries for one calendar month
pub fn month_entries(store: &CardStore, year: i32, month: u32) -> Result<Vec<ScheduleEntry>> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| Error::InvalidDate(format!("{}-{:02}", year, month)))?;
    let end = start
        .checked_add_months(chrono::Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| Error::InvalidDate(format!("{}-{:02}", year, month)))?;
    Ok(entries_between(store, start, end))
}

/// Cards waiting for a date, in pipeline order
pub fn awaiting_schedule(store: &CardStore) -> Vec<&Card> {
    StageId::ALL
        .into_iter()
        .flat_map(|stage| store.stage_cards(stage))
        .filter(|c| c.scheduling == Scheduling::ToSchedule)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{NewCard, parse_date};

    fn ids(cards: &[&Card]) -> Vec<String> {
        cards.iter().map(|c| c.id.clone()).collect()
    }

    #[test]
    fn test_schedule_then_unschedule() {
        let mut store = CardStore::new("card");
        let x = store.add_card(StageId::ToEdit, NewCard::titled("X")).id.clone();
        let june5 = parse_date("2025-06-05").unwrap();

        schedule(&mut store, &x, june5).unwrap();
        assert_eq!(ids(&cards_on_date(&store, june5)), vec![x.clone()]);
        assert_eq!(store.get(&x).unwrap().stage, StageId::ToEdit);

        unschedule(&mut store, &x, SchedulingStatus::ToSchedule).unwrap();
        assert!(cards_on_date(&store, june5).is_empty());
        let card = store.get(&x).unwrap();
        assert_eq!(card.scheduling, Scheduling::ToSchedule);
        assert_eq!(card.scheduled_date(), None);
    }

    #[test]
    fn test_reschedule_overwrites() {
        let mut store = CardStore::new("card");
        let x = store.add_card(StageId::Ideate, NewCard::titled("X")).id.clone();
        let first = parse_date("2025-06-05").unwrap();
        let second = parse_date("2025-06-09").unwrap();

        schedule(&mut store, &x, first).unwrap();
        schedule(&mut store, &x, second).unwrap();

        assert!(cards_on_date(&store, first).is_empty());
        assert_eq!(cards_on_date(&store, second).len(), 1);
    }

    #[test]
    fn test_schedule_missing_card() {
        let mut store = CardStore::new("card");
        let date = parse_date("2025-06-05").unwrap();
        assert!(matches!(
            schedule(&mut store, "card-nope00", date),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_cards_on_date_sorted_by_id() {
        let mut store = CardStore::new("card");
        let date = parse_date("2025-06-05").unwrap();
        for title in ["A", "B", "C", "D"] {
            let id = store.add_card(StageId::Ideate, NewCard::titled(title)).id.clone();
            schedule(&mut store, &id, date).unwrap();
        }
        let found = ids(&cards_on_date(&store, date));
        let mut sorted = found.clone();
        sorted.sort();
        assert_eq!(found, sorted);
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_month_entries() {
        let mut store = CardStore::new("card");
        let a = store.add_card(StageId::Ideate, NewCard::titled("A")).id.clone();
        let b = store.add_card(StageId::Ideate, NewCard::titled("B")).id.clone();
        let c = store.add_card(StageId::Ideate, NewCard::titled("C")).id.clone();
        schedule(&mut store, &a, parse_date("2024-02-29").unwrap()).unwrap();
        schedule(&mut store, &b, parse_date("2024-02-01").unwrap()).unwrap();
        schedule(&mut store, &c, parse_date("2024-03-01").unwrap()).unwrap();

        let entries = month_entries(&store, 2024, 2).unwrap();
        let dates: Vec<String> = entries.iter().map(|e| e.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-02-01", "2024-02-29"]);
        assert!(month_entries(&store, 2024, 13).is_err());
    }

    #[test]
    fn test_awaiting_schedule() {
        let mut store = CardStore::new("card");
        let a = store.add_card(StageId::ToSchedule, NewCard::titled("A")).id.clone();
        let b = store.add_card(StageId::Ideate, NewCard::titled("B")).id.clone();
        mark_to_schedule(&mut store, &a).unwrap();
        mark_to_schedule(&mut store, &b).unwrap();

        assert_eq!(ids(&awaiting_schedule(&store)), vec![b.clone(), a.clone()]);

        schedule(&mut store, &a, parse_date("2025-01-01").unwrap()).unwrap();
        assert!(mark_to_schedule(&mut store, &a).is_err());
        assert_eq!(ids(&awaiting_schedule(&store)), vec![b]);
    }
}
