//! Built-in jobs.

use std::path::PathBuf;

use crate::pipeline::Job;
use crate::types::{
    AcquisitionMode, ExportColumn, ExportSchema, FieldMapping, FieldRule, ValueParser,
};

/// Names accepted by [`preset`].
pub const PRESET_NAMES: &[&str] = &["amazon-reviews", "indiegogo-projects"];

/// Look up a built-in job by name.
pub fn preset(name: &str) -> Option<Job> {
    match name {
        "amazon-reviews" => Some(amazon_reviews()),
        "indiegogo-projects" => Some(indiegogo_projects()),
        _ => None,
    }
}

/// Reviews on an Amazon product page, with a Chinese translation column and
/// the first review image embedded.
pub fn amazon_reviews() -> Job {
    let mapping = FieldMapping::new(
        ".review",
        vec![
            FieldRule::text("englishContent", ".review-text-content"),
            FieldRule::attribute("imageUrl", ".review-image-tile", "src").as_link(),
            FieldRule::constant("brand", ""),
            FieldRule::constant("source", "亚马逊"),
            FieldRule::text("userName", ".a-profile-name"),
            FieldRule::href("userLink", ".a-profile"),
            FieldRule::href("reviewLink", ".a-link-normal"),
        ],
    )
    .translate("englishContent", "chineseContent");

    let schema = ExportSchema::new(
        "Amazon Reviews",
        vec![
            ExportColumn::new("评论内容（英文）", "englishContent", 30.0),
            ExportColumn::new("评论内容（中文）", "chineseContent", 30.0),
            ExportColumn::image("评论图片", "imageUrl", 15.0),
            ExportColumn::new("涉及品牌", "brand", 15.0),
            ExportColumn::new("评论来源", "source", 15.0),
            ExportColumn::new("评论用户", "userLink", 30.0),
            ExportColumn::new("评论链接", "reviewLink", 30.0),
        ],
    );

    Job {
        name: "amazon-reviews".into(),
        urls: vec![
            "https://www.amazon.com/MEEPO-Electric-Skateboard-32Mph-Motors/dp/B0C5QCVTBJ/ref=cm_cr_arp_d_product_top".into(),
        ],
        mode: AcquisitionMode::Static,
        mapping,
        schema,
        output: PathBuf::from("amazon_reviews.xlsx"),
        target_locale: "zh-CN".into(),
        sheet_name: None,
    }
}

/// One row per Indiegogo campaign page. Needs a browser: the campaign
/// details are rendered client-side.
pub fn indiegogo_projects() -> Job {
    let mapping = FieldMapping::new(
        "body",
        vec![
            FieldRule::text("name", ".basicsSection-title"),
            FieldRule::text("description", "div.basicsSection-tagline"),
            FieldRule::page_url("link"),
            FieldRule::text("creator", ".campaignOwnerName-tooltip"),
            FieldRule::text("location", "div.basicsCampaignOwner-details-city"),
            FieldRule::text("startDate", "div.campaignHeaderBasics-deadline")
                .with_parser(ValueParser::RangeStart),
            FieldRule::text(
                "endDate",
                ".basicsGoalProgress-progressDetails-detailsGoal-goalMetDate",
            )
            .with_parser(ValueParser::After("on".into())),
            FieldRule::text("duration", "div.campaignHeaderBasics-duration"),
            FieldRule::text("targetAmount", "div.campaignHeaderBasics-goal span"),
            FieldRule::text("actualAmount", ".basicsGoalProgress-amountSold.t-rebrand-h4s"),
            // Amounts are reported in USD already.
            FieldRule::text("actualAmountUSD", ".basicsGoalProgress-amountSold.t-rebrand-h4s"),
            FieldRule::text(
                "backers",
                ".basicsGoalProgress-claimedOrBackers span:nth-of-type(1)",
            ),
        ],
    );

    let schema = ExportSchema::new(
        "Indiegogo Project",
        vec![
            ExportColumn::new("项目名称", "name", 30.0),
            ExportColumn::new("项目描述", "description", 50.0),
            ExportColumn::new("项目链接", "link", 50.0),
            ExportColumn::new("项目发起人", "creator", 30.0),
            ExportColumn::new("项目所在地区", "location", 30.0),
            ExportColumn::new("众筹开始时间", "startDate", 20.0),
            ExportColumn::new("众筹结束时间", "endDate", 20.0),
            ExportColumn::new("众筹周期时长", "duration", 20.0),
            ExportColumn::new("众筹是否成功", "isSuccess", 15.0),
            ExportColumn::new("目标众筹金额", "targetAmount", 20.0),
            ExportColumn::new("实际众筹金额", "actualAmount", 20.0),
            ExportColumn::new("实际众筹金额（美元）", "actualAmountUSD", 25.0),
            ExportColumn::new("实际众筹人数", "backers", 15.0),
        ],
    );

    Job {
        name: "indiegogo-projects".into(),
        urls: [
            "yiiboard-the-coolest-electric-skateboard-ever",
            "hurricanex-the-most-powerful-electric-skateboard",
            "charge-boards-electric-skateboards-under-500",
            "panzerboard-powerful-all-terrain-e-skateboard",
        ]
        .iter()
        .map(|slug| format!("https://www.indiegogo.com/projects/{slug}/x/37902132#/"))
        .collect(),
        mode: AcquisitionMode::Rendered,
        mapping,
        schema,
        output: PathBuf::from("IndiegogoProjectInfo.xlsx"),
        target_locale: "zh-CN".into(),
        sheet_name: None,
    }
}
