//! Notification response statistics, per batch and per communication channel.

use crate::model::{BatchStatus, Channel, NotificationBatch, RecipientResponse, ResponseStatus};
use serde::{Deserialize, Serialize};
use sickbay_types::Percent;
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ResponseTally {
    pub agreed: usize,
    pub declined: usize,
    pub no_response: usize,
    /// Share of recipients who answered either way.
    #[schema(value_type = u8)]
    pub response_rate_pct: Percent,
}

/// Counts answers by category. An empty list yields a zeroed tally.
pub fn tally_responses(responses: &[RecipientResponse]) -> ResponseTally {
    let mut tally = ResponseTally::default();
    for response in responses {
        match response.response {
            ResponseStatus::Agreed => tally.agreed += 1,
            ResponseStatus::Declined => tally.declined += 1,
            ResponseStatus::NoResponse => tally.no_response += 1,
        }
    }
    tally.response_rate_pct = Percent::ratio(tally.agreed + tally.declined, responses.len());
    tally
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ChannelEffectiveness {
    pub channel: Channel,
    pub sent: usize,
    pub responded: usize,
    #[schema(value_type = u8)]
    pub rate_pct: Percent,
}

/// Response rate for one channel. Channels with nothing sent report 0%.
pub fn tally_channel_effectiveness(
    channel: Channel,
    sent: usize,
    responded: usize,
) -> ChannelEffectiveness {
    ChannelEffectiveness {
        channel,
        sent,
        responded,
        rate_pct: Percent::ratio(responded, sent),
    }
}

/// Groups batches by channel, counting recipients as sent and answers as responded.
///
/// Only batches whose status is `Sent` contribute, whether or not a send date was recorded.
pub fn tally_channels(batches: &[NotificationBatch]) -> Vec<ChannelEffectiveness> {
    let mut totals: BTreeMap<Channel, (usize, usize)> = BTreeMap::new();
    for batch in batches.iter().filter(|b| b.status == BatchStatus::Sent) {
        let entry = totals.entry(batch.channel).or_default();
        entry.0 += batch.total_recipients;
        entry.1 += batch.response_count;
    }
    totals
        .into_iter()
        .map(|(channel, (sent, responded))| tally_channel_effectiveness(channel, sent, responded))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn response(status: ResponseStatus) -> RecipientResponse {
        RecipientResponse {
            response: status,
            ..RecipientResponse::default()
        }
    }

    #[test]
    fn tallies_mixed_responses() {
        let responses = vec![
            response(ResponseStatus::Agreed),
            response(ResponseStatus::Declined),
            response(ResponseStatus::Agreed),
            response(ResponseStatus::NoResponse),
        ];
        let tally = tally_responses(&responses);
        assert_eq!(tally.agreed, 2);
        assert_eq!(tally.declined, 1);
        assert_eq!(tally.no_response, 1);
        assert_eq!(tally.response_rate_pct.value(), 75);
    }

    #[test]
    fn empty_responses_are_zeroed() {
        assert_eq!(tally_responses(&[]), ResponseTally::default());
    }

    #[test]
    fn channel_rate_is_guarded() {
        let unused = tally_channel_effectiveness(Channel::Sms, 0, 0);
        assert_eq!(unused.rate_pct.value(), 0);

        let email = tally_channel_effectiveness(Channel::Email, 40, 30);
        assert_eq!(email.rate_pct.value(), 75);
    }

    #[test]
    fn channels_group_sent_batches() {
        let sent_at = Some(Utc.with_ymd_and_hms(2024, 9, 20, 7, 0, 0).unwrap());
        let batches = vec![
            NotificationBatch {
                id: "1".into(),
                status: BatchStatus::Sent,
                sent_date: sent_at,
                channel: Channel::App,
                total_recipients: 30,
                response_count: 20,
                ..NotificationBatch::default()
            },
            NotificationBatch {
                id: "2".into(),
                status: BatchStatus::Sent,
                sent_date: sent_at,
                channel: Channel::App,
                total_recipients: 10,
                response_count: 10,
                ..NotificationBatch::default()
            },
            NotificationBatch {
                id: "3".into(),
                status: BatchStatus::Draft,
                channel: Channel::Email,
                total_recipients: 50,
                ..NotificationBatch::default()
            },
        ];

        let report = tally_channels(&batches);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].channel, Channel::App);
        assert_eq!(report[0].sent, 40);
        assert_eq!(report[0].responded, 30);
        assert_eq!(report[0].rate_pct.value(), 75);
    }

    #[test]
    fn channel_rate_caps_at_hundred() {
        let oversubscribed = tally_channel_effectiveness(Channel::Sms, 5, 8);
        assert_eq!(oversubscribed.responded, 8);
        assert_eq!(oversubscribed.rate_pct.value(), 100);
    }

    #[test]
    fn channels_follow_status_not_send_date() {
        let stale_date = Some(Utc.with_ymd_and_hms(2024, 9, 1, 7, 0, 0).unwrap());
        let batches = vec![
            NotificationBatch {
                id: "imported".into(),
                status: BatchStatus::Sent,
                sent_date: None,
                channel: Channel::Sms,
                total_recipients: 4,
                response_count: 1,
                ..NotificationBatch::default()
            },
            NotificationBatch {
                id: "rescheduled".into(),
                status: BatchStatus::Scheduled,
                sent_date: stale_date,
                channel: Channel::Sms,
                total_recipients: 20,
                response_count: 0,
                ..NotificationBatch::default()
            },
        ];

        let report = tally_channels(&batches);
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].sent, 4);
        assert_eq!(report[0].responded, 1);
        assert_eq!(report[0].rate_pct.value(), 25);
    }
}
